use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AnalysisStatus, ConsultationStatus, RiskLabel};

/// Clinical intake captured with the upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeFields {
    pub age: u32,
    pub gender: String,
    pub cholesterol_level: Option<String>,
    pub smoking_history: String,
    pub blood_pressure: Option<String>,
}

/// RiskOracle output. Field names follow the scorer's wire format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskVector {
    #[serde(rename = "CAD")]
    pub cad: f64,
    #[serde(rename = "HF")]
    pub hf: f64,
    #[serde(rename = "ARR")]
    pub arr: f64,
    #[serde(rename = "Overall_Risk")]
    pub overall_risk: f64,
}

impl RiskVector {
    /// Every component is a finite probability in [0,1].
    pub fn is_valid(&self) -> bool {
        [self.cad, self.hf, self.arr, self.overall_risk]
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }

    /// OverallRisk as a whole percentage.
    pub fn overall_percent(&self) -> u32 {
        (self.overall_risk * 100.0).round() as u32
    }
}

/// One uploaded ECG recording and its analysis outcome.
///
/// `risk` is `Some` exactly when `analysis_status` is `Completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcgRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub intake: IntakeFields,
    pub ecg_file_path: String,
    pub analysis_status: AnalysisStatus,
    pub risk: Option<RiskVector>,
    pub consultation_status: ConsultationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EcgRecord {
    pub fn risk_label(&self) -> RiskLabel {
        RiskLabel::from_overall(self.risk.map(|r| r.overall_risk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(overall: f64) -> RiskVector {
        RiskVector { cad: 0.1, hf: 0.2, arr: 0.3, overall_risk: overall }
    }

    #[test]
    fn valid_vector_in_unit_interval() {
        assert!(vector(0.0).is_valid());
        assert!(vector(1.0).is_valid());
        assert!(!vector(1.2).is_valid());
        assert!(!vector(-0.01).is_valid());
        assert!(!vector(f64::NAN).is_valid());
    }

    #[test]
    fn percent_rounds() {
        assert_eq!(vector(0.8).overall_percent(), 80);
        assert_eq!(vector(0.736).overall_percent(), 74);
        assert_eq!(vector(0.2).overall_percent(), 20);
    }

    #[test]
    fn deserializes_scorer_payload() {
        let v: RiskVector = serde_json::from_str(
            r#"{"CAD": 0.4, "HF": 0.1, "ARR": 0.05, "Overall_Risk": 0.73}"#,
        )
        .unwrap();
        assert_eq!(v.overall_risk, 0.73);
        assert_eq!(v.arr, 0.05);
    }
}
