//! Service configuration.

use std::time::Duration;

use config::{Config as Cfg, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::LifecycleError;
use crate::models::PaymentRules;
use crate::services::reconciliation::Tolerance;

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Per-operation timeout in seconds; unset means no timeout.
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
    /// Relative payment tolerance, e.g. 0.01 for 1% of the invoice total.
    #[serde(default = "default_tolerance_relative")]
    pub tolerance_relative: Decimal,
    /// Tolerance floor in minor currency units, e.g. 0.01.
    #[serde(default = "default_tolerance_minimum")]
    pub tolerance_minimum: Decimal,
    #[serde(default = "default_minimum_payment_amount")]
    pub minimum_payment_amount: Decimal,
    #[serde(default)]
    pub allow_overpayment: bool,
    #[serde(default = "default_overpayment_tolerance_percent")]
    pub overpayment_tolerance_percent: Decimal,
    #[serde(default = "default_auto_update_status")]
    pub auto_update_status: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tolerance_relative() -> Decimal {
    Decimal::new(1, 2)
}

fn default_tolerance_minimum() -> Decimal {
    Decimal::new(1, 2)
}

fn default_minimum_payment_amount() -> Decimal {
    Decimal::new(1, 2)
}

fn default_overpayment_tolerance_percent() -> Decimal {
    Decimal::ZERO
}

fn default_auto_update_status() -> bool {
    true
}

impl ServiceConfig {
    pub fn load() -> Result<Self, LifecycleError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn tolerance(&self) -> Tolerance {
        Tolerance {
            relative: self.tolerance_relative,
            minimum: self.tolerance_minimum,
        }
    }

    pub fn payment_rules(&self) -> PaymentRules {
        PaymentRules {
            minimum_amount: self.minimum_payment_amount,
            allow_overpayment: self.allow_overpayment,
            overpayment_tolerance_percent: self.overpayment_tolerance_percent,
            auto_update_status: self.auto_update_status,
            ..PaymentRules::default()
        }
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }
}
