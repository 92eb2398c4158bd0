use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The stored string is also the serde name.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(AnalysisStatus {
    Pending => "Pending",
    Completed => "Completed",
    Failed => "Failed",
});

str_enum!(ConsultationStatus {
    Pending => "Pending",
    Done => "Done",
});

str_enum!(AppointmentStatus {
    Pending => "pending",
    View => "view",
    Completed => "completed",
});

str_enum!(RiskLabel {
    Low => "Low Risk",
    High => "High Risk",
    Unknown => "Unknown",
});

str_enum!(NotificationKind {
    EcgUpload => "ECG_UPLOAD",
    ReportReady => "REPORT_READY",
    DoctorViewed => "DOCTOR_VIEWED",
    AppointmentBooked => "APPOINTMENT_BOOKED",
    PrescriptionAdded => "PRESCRIPTION_ADDED",
    AccountApproved => "ACCOUNT_APPROVED",
    AccountRejected => "ACCOUNT_REJECTED",
});

/// OverallRisk above this is High Risk.
pub const HIGH_RISK_THRESHOLD: f64 = 0.5;

impl RiskLabel {
    /// Label derived from an OverallRisk score; `None` means no analysis.
    pub fn from_overall(overall_risk: Option<f64>) -> Self {
        match overall_risk {
            Some(score) if score > HIGH_RISK_THRESHOLD => Self::High,
            Some(_) => Self::Low,
            None => Self::Unknown,
        }
    }
}
