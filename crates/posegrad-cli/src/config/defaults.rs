pub struct DefaultsConfig {
    pub base_lr: f64,
    pub lr_policy: String,
    pub max_iter: usize,
    pub momentum: f64,
    pub display: usize,
    pub snapshot_format: String,
    pub execution_mode: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            base_lr: 0.01,
            lr_policy: "fixed".to_string(),
            max_iter: 1000,
            momentum: 0.9,
            display: 100,
            snapshot_format: "binary".to_string(),
            execution_mode: "cpu".to_string(),
        }
    }
}
