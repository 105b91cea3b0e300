//! Strategy parameters: validated once, immutable afterwards.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid strategy or indicator parameters. Raised before any bar is read.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be a finite number, got {value}")]
    NotFinite { name: &'static str, value: f64 },

    #[error("{name} must be greater than zero, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("leverage must be at least 1, got {0}")]
    LeverageBelowOne(f64),

    #[error("maintenance_margin_ratio must lie strictly between 0 and 1, got {0}")]
    MaintenanceRatioOutOfRange(f64),

    #[error("indicator window '{name}' must be at least 1")]
    ZeroWindow { name: &'static str },

    #[error("macd_fast ({fast}) must be shorter than macd_slow ({slow})")]
    MacdWindowsInverted { fast: usize, slow: usize },
}

/// Leveraged strategy parameters.
///
/// Percent fields are fractions (`0.05` = 5%). Construct with
/// [`StrategyParams::new`]; deserialization runs the same validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStrategyParams")]
pub struct StrategyParams {
    take_profit_pct: f64,
    stop_loss_pct: f64,
    leverage: f64,
    initial_margin: f64,
    maintenance_margin_ratio: f64,
}

/// Unvalidated wire form of [`StrategyParams`].
#[derive(Debug, Clone, Copy, Deserialize)]
struct RawStrategyParams {
    take_profit_pct: f64,
    stop_loss_pct: f64,
    #[serde(default = "default_leverage")]
    leverage: f64,
    #[serde(default = "default_initial_margin")]
    initial_margin: f64,
    #[serde(default = "default_maintenance_ratio")]
    maintenance_margin_ratio: f64,
}

fn default_leverage() -> f64 {
    1.0
}

fn default_initial_margin() -> f64 {
    100.0
}

fn default_maintenance_ratio() -> f64 {
    0.8
}

impl TryFrom<RawStrategyParams> for StrategyParams {
    type Error = ConfigError;

    fn try_from(raw: RawStrategyParams) -> Result<Self, Self::Error> {
        Self::new(
            raw.take_profit_pct,
            raw.stop_loss_pct,
            raw.leverage,
            raw.initial_margin,
            raw.maintenance_margin_ratio,
        )
    }
}

fn finite(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::NotFinite { name, value })
    }
}

fn positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    let value = finite(name, value)?;
    if value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

impl StrategyParams {
    pub fn new(
        take_profit_pct: f64,
        stop_loss_pct: f64,
        leverage: f64,
        initial_margin: f64,
        maintenance_margin_ratio: f64,
    ) -> Result<Self, ConfigError> {
        let take_profit_pct = positive("take_profit_pct", take_profit_pct)?;
        let stop_loss_pct = positive("stop_loss_pct", stop_loss_pct)?;
        let leverage = positive("leverage", leverage)?;
        if leverage < 1.0 {
            return Err(ConfigError::LeverageBelowOne(leverage));
        }
        let initial_margin = positive("initial_margin", initial_margin)?;
        let ratio = finite("maintenance_margin_ratio", maintenance_margin_ratio)?;
        if ratio <= 0.0 || ratio >= 1.0 {
            return Err(ConfigError::MaintenanceRatioOutOfRange(ratio));
        }

        Ok(Self {
            take_profit_pct,
            stop_loss_pct,
            leverage,
            initial_margin,
            maintenance_margin_ratio: ratio,
        })
    }

    pub fn take_profit_pct(&self) -> f64 {
        self.take_profit_pct
    }

    pub fn stop_loss_pct(&self) -> f64 {
        self.stop_loss_pct
    }

    pub fn leverage(&self) -> f64 {
        self.leverage
    }

    pub fn initial_margin(&self) -> f64 {
        self.initial_margin
    }

    pub fn maintenance_margin_ratio(&self) -> f64 {
        self.maintenance_margin_ratio
    }

    /// Fractional adverse move that exhausts the margin down to the maintenance level.
    pub fn margin_buffer_fraction(&self) -> f64 {
        (1.0 - self.maintenance_margin_ratio) / self.leverage
    }
}

/// Window lengths handed to the indicator collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorWindows {
    pub ema: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi: usize,
}

impl Default for IndicatorWindows {
    fn default() -> Self {
        Self {
            ema: 200,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            rsi: 14,
        }
    }
}

impl IndicatorWindows {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, w) in [
            ("ema", self.ema),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
            ("rsi", self.rsi),
        ] {
            if w == 0 {
                return Err(ConfigError::ZeroWindow { name });
            }
        }
        if self.macd_fast >= self.macd_slow {
            return Err(ConfigError::MacdWindowsInverted {
                fast: self.macd_fast,
                slow: self.macd_slow,
            });
        }
        Ok(())
    }

    /// Index of the first bar at which every indicator is defined.
    pub fn warmup(&self) -> usize {
        let ema = self.ema.saturating_sub(1);
        let signal = self.macd_slow.saturating_sub(1) + self.macd_signal.saturating_sub(1);
        let rsi = self.rsi.saturating_sub(1);
        ema.max(signal).max(rsi)
    }
}
