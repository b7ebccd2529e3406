use bitaxe_logger_common::config::STORE_NAMESPACE;
use bitaxe_logger_common::error::StoreError;
use bitaxe_logger_common::store::KeyValueStore;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

/// Longest value any configuration key holds, plus the terminator.
const MAX_VALUE: usize = 100;

/// The `config` namespace of the default NVS partition.
pub struct NvsStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsStore {
    pub fn open(partition: EspDefaultNvsPartition) -> Result<Self, StoreError> {
        let nvs = EspNvs::new(partition, STORE_NAMESPACE, true)
            .map_err(|e| StoreError::new(e.to_string()))?;
        Ok(Self { nvs })
    }
}

impl KeyValueStore for NvsStore {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let mut buffer = [0u8; MAX_VALUE];
        let value = self
            .nvs
            .get_str(key, &mut buffer)
            .map_err(|e| StoreError::new(format!("{key}: {e}")))?;
        Ok(value.map(str::to_owned))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.nvs
            .set_str(key, value)
            .map_err(|e| StoreError::new(format!("{key}: {e}")))
    }
}
