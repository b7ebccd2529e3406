use std::time::Duration;

use bitaxe_logger_common::clock::TimeSync;
use bitaxe_logger_common::error::TimeSyncError;
use esp_idf_svc::sntp::{EspSntp, SntpConf, SyncStatus};
use log::info;

/// Polls per synchronisation attempt, `POLL_INTERVAL` apart.
const MAX_POLLS: u32 = 30;
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Keeps the SNTP service running once started.
#[derive(Default)]
pub struct EspTimeSync {
    sntp: Option<EspSntp<'static>>,
}

impl TimeSync for EspTimeSync {
    fn sync(&mut self, server: &str) -> Result<(), TimeSyncError> {
        // The service keeps polling this server for the rest of the run.
        let server: &'static str = Box::leak(server.to_owned().into_boxed_str());
        let mut conf = SntpConf::default();
        conf.servers[0] = server;

        let sntp = EspSntp::new(&conf).map_err(|e| TimeSyncError::new(e.to_string()))?;
        info!("SNTP started with {server}");

        for _ in 0..MAX_POLLS {
            if sntp.get_sync_status() == SyncStatus::Completed {
                self.sntp = Some(sntp);
                return Ok(());
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        // Leave it running; the clock may still be set later.
        self.sntp = Some(sntp);
        Err(TimeSyncError::new(format!("no answer from {server}")))
    }
}
