pub mod analysis;
pub mod oracle;

pub use analysis::{AnalysisPipeline, EcgHistoryEntry};
pub use oracle::{HttpRiskOracle, MockRiskOracle, OracleError, Recording, RiskOracle};
