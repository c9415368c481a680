//! Report output port trait.

use crate::domain::error::SigtraderError;
use crate::domain::simulation::{BacktestRequest, BacktestResponse};

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(
        &self,
        response: &BacktestResponse,
        request: &BacktestRequest,
        output_path: &str,
    ) -> Result<(), SigtraderError>;
}
