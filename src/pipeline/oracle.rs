use std::time::Duration;

use thiserror::Error;

use crate::models::RiskVector;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Risk oracle is not reachable at {0}")]
    Connection(String),

    #[error("Risk oracle timed out after {0:?}")]
    Timeout(Duration),

    #[error("Risk oracle returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Invalid risk oracle response: {0}")]
    InvalidResponse(String),

    #[error("HTTP client error: {0}")]
    Http(String),
}

/// An uploaded ECG recording as handed to the scorer.
#[derive(Debug, Clone)]
pub struct Recording {
    /// Where the upload was stored; persisted on the EcgRecord.
    pub file_path: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// External scorer turning a recording into a risk vector.
pub trait RiskOracle: Send + Sync {
    fn score(&self, recording: &Recording) -> Result<RiskVector, OracleError>;
}

/// HTTP client for the scoring service.
///
/// Sends the recording as a multipart `file` part and expects
/// `{"CAD", "HF", "ARR", "Overall_Risk"}` back.
pub struct HttpRiskOracle {
    url: String,
    timeout: Duration,
}

impl HttpRiskOracle {
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    // Built per call so the blocking client lives and dies on the worker
    // thread that uses it.
    fn client(&self) -> Result<reqwest::blocking::Client, OracleError> {
        reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| OracleError::Http(e.to_string()))
    }

    fn map_send_error(&self, e: reqwest::Error) -> OracleError {
        if e.is_timeout() {
            OracleError::Timeout(self.timeout)
        } else if e.is_connect() {
            OracleError::Connection(self.url.clone())
        } else {
            OracleError::Http(e.to_string())
        }
    }
}

impl RiskOracle for HttpRiskOracle {
    fn score(&self, recording: &Recording) -> Result<RiskVector, OracleError> {
        let part = reqwest::blocking::multipart::Part::bytes(recording.bytes.clone())
            .file_name(recording.file_name.clone())
            .mime_str(&recording.content_type)
            .map_err(|e| OracleError::Http(e.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new().part("file", part);

        let response = self
            .client()?
            .post(&self.url)
            .multipart(form)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().map_err(|e| self.map_send_error(e))?;
        let vector: RiskVector = serde_json::from_str(&body)
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        if !vector.is_valid() {
            return Err(OracleError::InvalidResponse(format!(
                "risk component outside [0,1]: {body}"
            )));
        }
        Ok(vector)
    }
}

/// Mock oracle for testing: returns a fixed vector or a fixed failure.
pub struct MockRiskOracle {
    outcome: MockOutcome,
}

enum MockOutcome {
    Score(RiskVector),
    Timeout,
    Unreachable,
}

impl MockRiskOracle {
    pub fn scoring(overall_risk: f64) -> Self {
        Self::with_vector(RiskVector {
            cad: 0.3,
            hf: 0.2,
            arr: 0.1,
            overall_risk,
        })
    }

    /// Returned as-is, even when out of range.
    pub fn with_vector(vector: RiskVector) -> Self {
        Self {
            outcome: MockOutcome::Score(vector),
        }
    }

    pub fn timing_out() -> Self {
        Self {
            outcome: MockOutcome::Timeout,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            outcome: MockOutcome::Unreachable,
        }
    }
}

impl RiskOracle for MockRiskOracle {
    fn score(&self, _recording: &Recording) -> Result<RiskVector, OracleError> {
        match &self.outcome {
            MockOutcome::Score(vector) => Ok(*vector),
            MockOutcome::Timeout => Err(OracleError::Timeout(Duration::from_secs(30))),
            MockOutcome::Unreachable => {
                Err(OracleError::Connection("http://mock-oracle".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    fn recording() -> Recording {
        Recording {
            file_path: "uploads/ecg.csv".into(),
            file_name: "ecg.csv".into(),
            content_type: "text/csv".into(),
            bytes: b"0.1,0.2,0.3".to_vec(),
        }
    }

    /// Serves exactly one request with the given status line and body.
    fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(value) = lower.strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
            }
            let mut body_buf = vec![0u8; content_length];
            reader.read_exact(&mut body_buf).unwrap();
            let body_text = String::from_utf8_lossy(&body_buf);
            assert!(body_text.contains("name=\"file\""));

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
        });
        format!("http://{addr}/predict")
    }

    #[test]
    fn parses_scorer_response() {
        let url = serve_once(
            "200 OK",
            r#"{"CAD": 0.61, "HF": 0.22, "ARR": 0.05, "Overall_Risk": 0.8}"#,
        );
        let oracle = HttpRiskOracle::new(&url, Duration::from_secs(5));
        let vector = oracle.score(&recording()).unwrap();
        assert_eq!(vector.cad, 0.61);
        assert_eq!(vector.overall_risk, 0.8);
    }

    #[test]
    fn out_of_range_component_is_invalid() {
        let url = serve_once(
            "200 OK",
            r#"{"CAD": 1.7, "HF": 0.22, "ARR": 0.05, "Overall_Risk": 0.8}"#,
        );
        let oracle = HttpRiskOracle::new(&url, Duration::from_secs(5));
        let err = oracle.score(&recording()).unwrap_err();
        assert!(matches!(err, OracleError::InvalidResponse(_)));
    }

    #[test]
    fn missing_field_is_invalid() {
        let url = serve_once("200 OK", r#"{"CAD": 0.1}"#);
        let oracle = HttpRiskOracle::new(&url, Duration::from_secs(5));
        assert!(matches!(
            oracle.score(&recording()),
            Err(OracleError::InvalidResponse(_))
        ));
    }

    #[test]
    fn error_status_carries_body() {
        let url = serve_once("500 Internal Server Error", r#"{"error":"model not loaded"}"#);
        let oracle = HttpRiskOracle::new(&url, Duration::from_secs(5));
        match oracle.score(&recording()).unwrap_err() {
            OracleError::Status { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("model not loaded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn silent_scorer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            std::thread::sleep(Duration::from_secs(2));
            drop(stream);
        });

        let oracle = HttpRiskOracle::new(&format!("http://{addr}/predict"), Duration::from_millis(300));
        let err = oracle.score(&recording()).unwrap_err();
        assert!(matches!(err, OracleError::Timeout(_)));
        hold.join().unwrap();
    }

    #[test]
    fn trailing_slash_trimmed() {
        let oracle = HttpRiskOracle::new("http://localhost:5000/predict/", Duration::from_secs(1));
        assert_eq!(oracle.url(), "http://localhost:5000/predict");
    }

    #[test]
    fn mock_oracle_outcomes() {
        assert_eq!(
            MockRiskOracle::scoring(0.8).score(&recording()).unwrap().overall_risk,
            0.8
        );
        assert!(matches!(
            MockRiskOracle::timing_out().score(&recording()),
            Err(OracleError::Timeout(_))
        ));
        assert!(matches!(
            MockRiskOracle::unreachable().score(&recording()),
            Err(OracleError::Connection(_))
        ));
    }
}
