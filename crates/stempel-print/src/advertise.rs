// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// DNS-SD advertisement of the printer as `_ipp._tcp.local.` (RFC 6763,
// PWG 5100.14 TXT keys) so clients on the LAN can find it.

use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::{info, warn};

use stempel_core::error::{Result, StempelError};

use crate::printer::DOCUMENT_FORMATS;

/// mDNS service type for plain IPP.
pub const IPP_SERVICE_TYPE: &str = "_ipp._tcp.local.";

/// Resource path clients post to.
const RESOURCE_PATH: &str = "ipp/print";

/// TXT record for a printer called `name`.
pub fn txt_record(name: &str) -> Vec<(&'static str, String)> {
    vec![
        ("txtvers", "1".to_owned()),
        ("qtotal", "1".to_owned()),
        ("rp", RESOURCE_PATH.to_owned()),
        ("ty", name.to_owned()),
        ("pdl", DOCUMENT_FORMATS.join(",")),
    ]
}

/// A live registration; dropping it without `withdraw` leaves the daemon
/// to expire the record on its own.
pub struct Advertisement {
    daemon: ServiceDaemon,
    fullname: String,
}

impl Advertisement {
    /// Register `name` on `port`.
    ///
    /// # Errors
    ///
    /// Returns [`StempelError::Advertise`] if the daemon cannot be started or
    /// the service cannot be registered.
    pub fn register(name: &str, port: u16) -> Result<Self> {
        let daemon =
            ServiceDaemon::new().map_err(|e| StempelError::Advertise(format!("mDNS daemon: {e}")))?;

        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "stempel".into());
        let txt = txt_record(name);
        let properties: Vec<(&str, &str)> = txt.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let service = ServiceInfo::new(
            IPP_SERVICE_TYPE,
            name,
            &format!("{hostname}.local."),
            "",
            port,
            &properties[..],
        )
        .map_err(|e| StempelError::Advertise(format!("service info: {e}")))?
        .enable_addr_auto();

        let fullname = service.get_fullname().to_owned();
        daemon
            .register(service)
            .map_err(|e| StempelError::Advertise(format!("register: {e}")))?;

        info!(service_type = IPP_SERVICE_TYPE, name, port, "mDNS service registered");
        Ok(Self { daemon, fullname })
    }

    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    /// Unregister the service and shut the daemon down.  Failures are
    /// logged only.
    pub fn withdraw(self) {
        match self.daemon.unregister(&self.fullname) {
            Ok(_) => info!(name = %self.fullname, "mDNS service unregistered"),
            Err(e) => warn!(error = %e, "failed to unregister mDNS service"),
        }
        if let Err(e) = self.daemon.shutdown() {
            warn!(error = %e, "failed to shut down mDNS daemon");
        }
    }
}
