//! Report output port trait.

use crate::domain::error::QmetricsError;
use serde::Serialize;

/// Port for writing analysis reports.
pub trait ReportPort {
    fn write<T: Serialize>(&self, report: &T) -> Result<(), QmetricsError>;
}
