//! Case review: booking a consult, the doctor opening it, the doctor
//! completing it. Status only moves forward (pending -> view -> completed);
//! every transition is a conditional update, so repeats are no-ops.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use super::WorkflowError;
use crate::db::{self, DatabaseError};
use crate::models::enums::{AppointmentStatus, NotificationKind, RiskLabel};
use crate::models::{Appointment, Doctor, EcgRecord, Patient};
use crate::notifications::{EmailChannel, NotificationDispatcher};

const OPEN_STATUSES: [AppointmentStatus; 2] = [AppointmentStatus::Pending, AppointmentStatus::View];

/// Everything a doctor sees when opening a case.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseDetails {
    pub appointment_id: Uuid,
    pub status: AppointmentStatus,
    pub patient: CasePatient,
    pub ecg_file_path: String,
    pub ai_risk: RiskLabel,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CasePatient {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub cholesterol: Option<String>,
    pub smoking: String,
    pub blood_pressure: Option<String>,
}

/// Row of a doctor's open-case list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseSummary {
    pub appointment_id: Uuid,
    pub patient_name: String,
    /// When the recording was uploaded.
    pub date: DateTime<Utc>,
    pub risk: RiskLabel,
    pub risk_value: Option<f64>,
    pub status: AppointmentStatus,
}

/// Row of a doctor's completed-report list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub appointment_id: Uuid,
    pub patient_name: String,
    pub date: DateTime<Utc>,
    pub risk: RiskLabel,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorListing {
    pub id: Uuid,
    pub full_name: String,
}

pub struct CaseWorkflow<'a> {
    conn: &'a Connection,
    email: &'a EmailChannel,
}

impl<'a> CaseWorkflow<'a> {
    pub fn new(conn: &'a Connection, email: &'a EmailChannel) -> Self {
        Self { conn, email }
    }

    fn dispatcher(&self) -> NotificationDispatcher<'a> {
        NotificationDispatcher::new(self.conn)
    }

    /// Books a consult for one of the patient's reports.
    ///
    /// The appointment insert and the report's consultation flag commit
    /// together. A report can be booked once; later attempts are `Conflict`.
    pub fn book(
        &self,
        patient_id: &Uuid,
        doctor_id: &Uuid,
        report_id: &Uuid,
    ) -> Result<Appointment, WorkflowError> {
        let patient = db::get_patient(self.conn, patient_id)?
            .ok_or_else(|| WorkflowError::not_found("patient", patient_id))?;
        let doctor = db::get_doctor(self.conn, doctor_id)?
            .ok_or_else(|| WorkflowError::not_found("doctor", doctor_id))?;
        let record = db::get_ecg_record(self.conn, report_id)?
            .filter(|r| r.patient_id == patient.id)
            .ok_or_else(|| WorkflowError::not_found("report", report_id))?;

        if db::get_appointment_by_report(self.conn, &record.id)?.is_some() {
            return Err(already_booked(&record.id));
        }

        let ts = db::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            doctor_id: doctor.id,
            report_id: record.id,
            status: AppointmentStatus::Pending,
            risk: record.risk_label(),
            notes: None,
            created_at: ts,
            updated_at: ts,
        };

        self.insert_booking(&appointment)?;

        tracing::info!(
            appointment_id = %appointment.id,
            report_id = %record.id,
            doctor_id = %doctor.id,
            risk = %appointment.risk,
            "Appointment booked"
        );

        let dispatcher = self.dispatcher();
        dispatcher.notify_patient(
            patient.id,
            &format!(
                "Your consultation with Dr. {} has been successfully booked.",
                doctor.full_name
            ),
            NotificationKind::AppointmentBooked,
            &format!("/appointment-status/{}", appointment.id),
        );
        dispatcher.notify_doctor(
            doctor.id,
            &format!(
                "A new appointment has been booked by a patient ({}).",
                patient.full_name
            ),
            NotificationKind::AppointmentBooked,
            &format!("/doctor-appointments/{}", appointment.id),
        );
        self.send_booking_emails(&patient, &doctor, &appointment);

        Ok(appointment)
    }

    /// Appointment insert and consultation flag in one transaction. A racing
    /// booking of the same report loses on UNIQUE(report_id).
    fn insert_booking(&self, appointment: &Appointment) -> Result<(), WorkflowError> {
        let tx = self.conn.unchecked_transaction()?;
        db::insert_appointment(&tx, appointment).map_err(|e| {
            if e.is_unique_violation() {
                already_booked(&appointment.report_id)
            } else {
                WorkflowError::Database(e)
            }
        })?;
        db::mark_consultation_done(&tx, &appointment.report_id)?;
        tx.commit()?;
        Ok(())
    }

    fn send_booking_emails(&self, patient: &Patient, doctor: &Doctor, appointment: &Appointment) {
        if let Some(to) = doctor.email.as_deref() {
            let html = format!(
                "<h3>New Appointment Request</h3>\
                 <p>Hello Dr. {doctor},</p>\
                 <p>A new appointment has been booked.</p>\
                 <ul>\
                 <li><strong>Patient:</strong> {patient}</li>\
                 <li><strong>Risk Level:</strong> {risk}</li>\
                 <li><strong>Date:</strong> {date}</li>\
                 </ul>\
                 <p>Please check your dashboard for details.</p>",
                doctor = escape_html(&doctor.full_name),
                patient = escape_html(&patient.full_name),
                risk = appointment.risk,
                date = appointment.created_at.format("%Y-%m-%d"),
            );
            self.email.send(to, "New Patient Appointment", &html);
        }

        if let Some(to) = patient.email.as_deref() {
            let html = format!(
                "<h3>Appointment Confirmed</h3>\
                 <p>Hello {patient},</p>\
                 <p>Your appointment with <strong>Dr. {doctor}</strong> has been successfully booked.</p>\
                 <p>We will notify you once the doctor reviews your report.</p>\
                 <p>Thank you.</p>",
                patient = escape_html(&patient.full_name),
                doctor = escape_html(&doctor.full_name),
            );
            self.email.send(to, "Appointment Booking Confirmation", &html);
        }
    }

    /// Moves a pending appointment to `view` and tells the patient. Opening
    /// an appointment that is already past pending changes nothing.
    pub fn mark_viewed(
        &self,
        appointment_id: &Uuid,
        doctor_id: &Uuid,
    ) -> Result<Appointment, WorkflowError> {
        let changed = db::transition_appointment_status(
            self.conn,
            appointment_id,
            doctor_id,
            &[AppointmentStatus::Pending],
            AppointmentStatus::View,
        )?;
        let appointment = self.owned_appointment(appointment_id, doctor_id)?;

        if changed {
            tracing::info!(appointment_id = %appointment.id, "Case opened by doctor");
            self.dispatcher().notify_patient(
                appointment.patient_id,
                &format!(
                    "Dr. {} has started reviewing your report.",
                    self.doctor_name(doctor_id)
                ),
                NotificationKind::DoctorViewed,
                &format!("/appointment-status/{}", appointment.id),
            );
        }
        Ok(appointment)
    }

    /// Completes an open appointment with the doctor's notes and final risk.
    /// Completing an already completed appointment is a no-op.
    pub fn complete(
        &self,
        appointment_id: &Uuid,
        doctor_id: &Uuid,
        notes: &str,
        final_risk: &str,
    ) -> Result<Appointment, WorkflowError> {
        let notes = notes.trim();
        if notes.is_empty() {
            return Err(WorkflowError::InvalidInput("notes are required".into()));
        }
        let final_risk = RiskLabel::from_str(final_risk.trim()).map_err(|_| {
            WorkflowError::InvalidInput(format!("unknown risk decision '{final_risk}'"))
        })?;

        let changed =
            db::complete_appointment(self.conn, appointment_id, doctor_id, notes, final_risk)?;
        let appointment = self.owned_appointment(appointment_id, doctor_id)?;

        if !changed {
            tracing::debug!(appointment_id = %appointment.id, "Appointment already completed");
            return Ok(appointment);
        }

        tracing::info!(appointment_id = %appointment.id, risk = %final_risk, "Case completed");
        let patient_name = match db::get_patient(self.conn, &appointment.patient_id) {
            Ok(Some(patient)) => patient.full_name,
            Ok(None) => "the patient".into(),
            Err(e) => {
                tracing::warn!(
                    patient_id = %appointment.patient_id,
                    error = %e,
                    "Patient lookup failed"
                );
                "the patient".into()
            }
        };

        let dispatcher = self.dispatcher();
        dispatcher.notify_patient(
            appointment.patient_id,
            &format!(
                "Dr. {} has reviewed your case and added a prescription.",
                self.doctor_name(doctor_id)
            ),
            NotificationKind::PrescriptionAdded,
            &format!("/appointment-status/{}", appointment.id),
        );
        dispatcher.notify_doctor(
            *doctor_id,
            &format!("You have successfully reviewed {patient_name}'s case."),
            NotificationKind::PrescriptionAdded,
            "/doctor/dashboard",
        );
        Ok(appointment)
    }

    /// Opens the case (see [`Self::mark_viewed`]) and returns what the
    /// doctor needs to review it.
    pub fn case_details(
        &self,
        appointment_id: &Uuid,
        doctor_id: &Uuid,
    ) -> Result<CaseDetails, WorkflowError> {
        let appointment = self.mark_viewed(appointment_id, doctor_id)?;
        let record = self.report_of(&appointment)?;
        let name = self.patient_name(&appointment.patient_id)?;

        Ok(CaseDetails {
            appointment_id: appointment.id,
            status: appointment.status,
            patient: CasePatient {
                name,
                age: record.intake.age,
                gender: record.intake.gender.clone(),
                cholesterol: record.intake.cholesterol_level.clone(),
                smoking: record.intake.smoking_history.clone(),
                blood_pressure: record.intake.blood_pressure.clone(),
            },
            ecg_file_path: record.ecg_file_path.clone(),
            ai_risk: record.risk_label(),
            notes: appointment.notes.unwrap_or_default(),
        })
    }

    /// The doctor's pending and viewed cases, newest first.
    pub fn open_cases(&self, doctor_id: &Uuid) -> Result<Vec<CaseSummary>, WorkflowError> {
        let appointments = db::list_doctor_appointments(self.conn, doctor_id, &OPEN_STATUSES)?;
        let mut cases = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            let record = self.report_of(&appointment)?;
            cases.push(CaseSummary {
                appointment_id: appointment.id,
                patient_name: self.patient_name(&appointment.patient_id)?,
                date: record.created_at,
                risk: record.risk_label(),
                risk_value: record.risk.map(|r| r.overall_risk),
                status: appointment.status,
            });
        }
        Ok(cases)
    }

    /// The doctor's completed cases, newest first.
    pub fn approved_reports(&self, doctor_id: &Uuid) -> Result<Vec<ReportSummary>, WorkflowError> {
        let appointments =
            db::list_doctor_appointments(self.conn, doctor_id, &[AppointmentStatus::Completed])?;
        let mut reports = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            reports.push(ReportSummary {
                appointment_id: appointment.id,
                patient_name: self.patient_name(&appointment.patient_id)?,
                date: appointment.created_at,
                risk: appointment.risk,
                status: appointment.status,
            });
        }
        Ok(reports)
    }

    pub fn approved_doctors(&self) -> Result<Vec<DoctorListing>, WorkflowError> {
        Ok(db::list_approved_doctors(self.conn)?
            .into_iter()
            .map(|d| DoctorListing {
                id: d.id,
                full_name: d.full_name,
            })
            .collect())
    }

    /// The appointment if it exists and belongs to this doctor.
    fn owned_appointment(
        &self,
        appointment_id: &Uuid,
        doctor_id: &Uuid,
    ) -> Result<Appointment, WorkflowError> {
        db::get_appointment_for_doctor(self.conn, appointment_id, doctor_id)?
            .ok_or_else(|| WorkflowError::not_found("appointment", appointment_id))
    }

    fn report_of(&self, appointment: &Appointment) -> Result<EcgRecord, WorkflowError> {
        db::get_ecg_record(self.conn, &appointment.report_id)?.ok_or_else(|| {
            WorkflowError::Database(DatabaseError::NotFound {
                entity_type: "EcgRecord".into(),
                id: appointment.report_id.to_string(),
            })
        })
    }

    fn patient_name(&self, patient_id: &Uuid) -> Result<String, WorkflowError> {
        Ok(db::get_patient(self.conn, patient_id)?
            .map(|p| p.full_name)
            .unwrap_or_else(|| "Unknown".into()))
    }

    /// Name used in notification text; a lookup failure falls back to a
    /// generic title.
    fn doctor_name(&self, doctor_id: &Uuid) -> String {
        match db::get_doctor(self.conn, doctor_id) {
            Ok(Some(doctor)) => doctor.full_name,
            Ok(None) => "Doctor".into(),
            Err(e) => {
                tracing::warn!(doctor_id = %doctor_id, error = %e, "Doctor lookup failed");
                "Doctor".into()
            }
        }
    }
}

fn already_booked(report_id: &Uuid) -> WorkflowError {
    WorkflowError::Conflict(format!("report {report_id} already has an appointment"))
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::ConsultationStatus;
    use crate::models::{Notification, Recipient};
    use crate::notifications::CapturingTransport;

    struct Fixture {
        conn: Connection,
        transport: CapturingTransport,
        email: EmailChannel,
        patient: Patient,
        doctor: Doctor,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_transport(CapturingTransport::new())
        }

        fn with_transport(transport: CapturingTransport) -> Self {
            let conn = open_memory_database().unwrap();
            let patient = fixtures::patient(&conn, "Sara Ali");
            let doctor = fixtures::doctor(&conn, "Imran Shah");
            let email = EmailChannel::start(Box::new(transport.clone()), "no-reply@test", 16);
            Self {
                conn,
                transport,
                email,
                patient,
                doctor,
            }
        }

        fn workflow(&self) -> CaseWorkflow<'_> {
            CaseWorkflow::new(&self.conn, &self.email)
        }

        fn booked(&self, overall_risk: Option<f64>) -> Appointment {
            let record = fixtures::record(&self.conn, self.patient.id, overall_risk);
            self.workflow()
                .book(&self.patient.id, &self.doctor.id, &record.id)
                .unwrap()
        }

        fn patient_feed(&self) -> Vec<Notification> {
            db::list_notifications(&self.conn, &Recipient::Patient(self.patient.id)).unwrap()
        }

        fn doctor_feed(&self) -> Vec<Notification> {
            db::list_notifications(&self.conn, &Recipient::Doctor(self.doctor.id)).unwrap()
        }

        /// Stops the email worker and returns what it delivered.
        fn delivered(self) -> Vec<crate::notifications::OutboundEmail> {
            let transport = self.transport.clone();
            drop(self);
            transport.sent()
        }
    }

    fn count_kind(feed: &[Notification], kind: NotificationKind) -> usize {
        feed.iter().filter(|n| n.kind == kind).count()
    }

    #[test]
    fn booking_snapshots_risk_and_notifies_both() {
        let fx = Fixture::new();
        let record = fixtures::record(&fx.conn, fx.patient.id, Some(0.73));

        let appt = fx.workflow().book(&fx.patient.id, &fx.doctor.id, &record.id).unwrap();
        assert_eq!(appt.status, AppointmentStatus::Pending);
        assert_eq!(appt.risk, RiskLabel::High);
        assert!(appt.notes.is_none());

        let stored = db::get_ecg_record(&fx.conn, &record.id).unwrap().unwrap();
        assert_eq!(stored.consultation_status, ConsultationStatus::Done);

        let patient_feed = fx.patient_feed();
        assert_eq!(patient_feed.len(), 1);
        assert_eq!(
            patient_feed[0].message,
            "Your consultation with Dr. Imran Shah has been successfully booked."
        );
        assert_eq!(patient_feed[0].link, format!("/appointment-status/{}", appt.id));

        let doctor_feed = fx.doctor_feed();
        assert_eq!(doctor_feed.len(), 1);
        assert_eq!(
            doctor_feed[0].message,
            "A new appointment has been booked by a patient (Sara Ali)."
        );
        assert_eq!(doctor_feed[0].link, format!("/doctor-appointments/{}", appt.id));

        let sent = fx.delivered();
        assert_eq!(sent.len(), 2);
        let to_doctor = sent.iter().find(|e| e.subject == "New Patient Appointment").unwrap();
        assert_eq!(to_doctor.to, "imran.shah@clinic.test");
        assert!(to_doctor.html.contains("Sara Ali"));
        assert!(to_doctor.html.contains("High Risk"));
        let to_patient = sent
            .iter()
            .find(|e| e.subject == "Appointment Booking Confirmation")
            .unwrap();
        assert_eq!(to_patient.to, "sara.ali@patients.test");
    }

    #[test]
    fn risk_label_from_report() {
        let fx = Fixture::new();
        assert_eq!(fx.booked(Some(0.2)).risk, RiskLabel::Low);
        assert_eq!(fx.booked(Some(0.5)).risk, RiskLabel::Low);
        assert_eq!(fx.booked(None).risk, RiskLabel::Unknown);
    }

    #[test]
    fn double_booking_is_conflict() {
        let fx = Fixture::new();
        let record = fixtures::record(&fx.conn, fx.patient.id, Some(0.7));
        fx.workflow().book(&fx.patient.id, &fx.doctor.id, &record.id).unwrap();

        let err = fx
            .workflow()
            .book(&fx.patient.id, &fx.doctor.id, &record.id)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));

        let appointments = db::list_patient_appointments(&fx.conn, &fx.patient.id).unwrap();
        assert_eq!(appointments.len(), 1);
        assert_eq!(count_kind(&fx.patient_feed(), NotificationKind::AppointmentBooked), 1);
    }

    #[test]
    fn booking_someone_elses_report_is_not_found() {
        let fx = Fixture::new();
        let other = fixtures::patient(&fx.conn, "Other Patient");
        let foreign = fixtures::record(&fx.conn, other.id, Some(0.7));

        let err = fx
            .workflow()
            .book(&fx.patient.id, &fx.doctor.id, &foreign.id)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
        let stored = db::get_ecg_record(&fx.conn, &foreign.id).unwrap().unwrap();
        assert_eq!(stored.consultation_status, ConsultationStatus::Pending);
    }

    #[test]
    fn booking_requires_known_parties() {
        let fx = Fixture::new();
        let record = fixtures::record(&fx.conn, fx.patient.id, Some(0.7));
        let wf = fx.workflow();

        assert!(matches!(
            wf.book(&Uuid::new_v4(), &fx.doctor.id, &record.id),
            Err(WorkflowError::NotFound(_))
        ));
        assert!(matches!(
            wf.book(&fx.patient.id, &Uuid::new_v4(), &record.id),
            Err(WorkflowError::NotFound(_))
        ));
        assert!(matches!(
            wf.book(&fx.patient.id, &fx.doctor.id, &Uuid::new_v4()),
            Err(WorkflowError::NotFound(_))
        ));
    }

    #[test]
    fn email_failure_does_not_fail_booking() {
        let fx = Fixture::with_transport(CapturingTransport::failing());
        let appt = fx.booked(Some(0.7));
        assert_eq!(appt.status, AppointmentStatus::Pending);
        assert_eq!(fx.doctor_feed().len(), 1);
        assert!(fx.delivered().is_empty());
    }

    #[test]
    fn no_email_without_address() {
        let fx = Fixture::new();
        let silent = Patient {
            id: Uuid::new_v4(),
            full_name: "No Mail".into(),
            email: None,
        };
        db::insert_patient(&fx.conn, &silent).unwrap();
        let record = fixtures::record(&fx.conn, silent.id, Some(0.4));
        fx.workflow().book(&silent.id, &fx.doctor.id, &record.id).unwrap();

        let sent = fx.delivered();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "New Patient Appointment");
    }

    #[test]
    fn double_view_notifies_once() {
        let fx = Fixture::new();
        let appt = fx.booked(Some(0.7));
        let wf = fx.workflow();

        let first = wf.mark_viewed(&appt.id, &fx.doctor.id).unwrap();
        let second = wf.mark_viewed(&appt.id, &fx.doctor.id).unwrap();
        assert_eq!(first.status, AppointmentStatus::View);
        assert_eq!(second.status, AppointmentStatus::View);

        let feed = fx.patient_feed();
        assert_eq!(count_kind(&feed, NotificationKind::DoctorViewed), 1);
        let viewed = feed.iter().find(|n| n.kind == NotificationKind::DoctorViewed).unwrap();
        assert_eq!(viewed.message, "Dr. Imran Shah has started reviewing your report.");
        assert_eq!(viewed.link, format!("/appointment-status/{}", appt.id));
    }

    #[test]
    fn other_doctor_cannot_open_case() {
        let fx = Fixture::new();
        let appt = fx.booked(Some(0.7));
        let other = fixtures::doctor(&fx.conn, "Other Doctor");

        let err = fx.workflow().mark_viewed(&appt.id, &other.id).unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
        let err = fx.workflow().mark_viewed(&Uuid::new_v4(), &fx.doctor.id).unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));

        let stored = db::get_appointment(&fx.conn, &appt.id).unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Pending);
        assert_eq!(count_kind(&fx.patient_feed(), NotificationKind::DoctorViewed), 0);
    }

    #[test]
    fn completing_viewed_case_notifies_both() {
        let fx = Fixture::new();
        let appt = fx.booked(Some(0.7));
        let wf = fx.workflow();
        wf.mark_viewed(&appt.id, &fx.doctor.id).unwrap();

        let done = wf
            .complete(&appt.id, &fx.doctor.id, "Start beta blockers", "Low Risk")
            .unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);
        assert_eq!(done.notes.as_deref(), Some("Start beta blockers"));
        assert_eq!(done.risk, RiskLabel::Low);

        let patient_feed = fx.patient_feed();
        let prescription: Vec<_> = patient_feed
            .iter()
            .filter(|n| n.kind == NotificationKind::PrescriptionAdded)
            .collect();
        assert_eq!(prescription.len(), 1);
        assert_eq!(
            prescription[0].message,
            "Dr. Imran Shah has reviewed your case and added a prescription."
        );

        let doctor_feed = fx.doctor_feed();
        let reviewed: Vec<_> = doctor_feed
            .iter()
            .filter(|n| n.kind == NotificationKind::PrescriptionAdded)
            .collect();
        assert_eq!(reviewed.len(), 1);
        assert_eq!(reviewed[0].message, "You have successfully reviewed Sara Ali's case.");
        assert_eq!(reviewed[0].link, "/doctor/dashboard");
    }

    #[test]
    fn pending_case_can_complete_directly() {
        let fx = Fixture::new();
        let appt = fx.booked(Some(0.7));
        let done = fx
            .workflow()
            .complete(&appt.id, &fx.doctor.id, "All clear", "High Risk")
            .unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);
    }

    #[test]
    fn repeat_completion_is_noop() {
        let fx = Fixture::new();
        let appt = fx.booked(Some(0.7));
        let wf = fx.workflow();
        wf.complete(&appt.id, &fx.doctor.id, "First notes", "High Risk").unwrap();
        let before = fx.patient_feed().len() + fx.doctor_feed().len();

        let again = wf
            .complete(&appt.id, &fx.doctor.id, "Second notes", "Low Risk")
            .unwrap();
        assert_eq!(again.notes.as_deref(), Some("First notes"));
        assert_eq!(again.risk, RiskLabel::High);
        assert_eq!(fx.patient_feed().len() + fx.doctor_feed().len(), before);
    }

    #[test]
    fn completed_case_never_regresses_to_view() {
        let fx = Fixture::new();
        let appt = fx.booked(Some(0.7));
        let wf = fx.workflow();
        wf.complete(&appt.id, &fx.doctor.id, "Done", "High Risk").unwrap();

        let viewed = wf.mark_viewed(&appt.id, &fx.doctor.id).unwrap();
        assert_eq!(viewed.status, AppointmentStatus::Completed);
        assert_eq!(count_kind(&fx.patient_feed(), NotificationKind::DoctorViewed), 0);
    }

    #[test]
    fn completion_input_validation() {
        let fx = Fixture::new();
        let appt = fx.booked(Some(0.7));
        let wf = fx.workflow();

        assert!(matches!(
            wf.complete(&appt.id, &fx.doctor.id, "   ", "High Risk"),
            Err(WorkflowError::InvalidInput(_))
        ));
        assert!(matches!(
            wf.complete(&appt.id, &fx.doctor.id, "notes", "Medium"),
            Err(WorkflowError::InvalidInput(_))
        ));
        let other = fixtures::doctor(&fx.conn, "Other Doctor");
        assert!(matches!(
            wf.complete(&appt.id, &other.id, "notes", "High Risk"),
            Err(WorkflowError::NotFound(_))
        ));

        let stored = db::get_appointment(&fx.conn, &appt.id).unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Pending);
    }

    #[test]
    fn case_details_opens_case() {
        let fx = Fixture::new();
        let appt = fx.booked(Some(0.8));

        let details = fx.workflow().case_details(&appt.id, &fx.doctor.id).unwrap();
        assert_eq!(details.status, AppointmentStatus::View);
        assert_eq!(details.patient.name, "Sara Ali");
        assert_eq!(details.patient.age, 54);
        assert_eq!(details.patient.blood_pressure.as_deref(), Some("140/90"));
        assert_eq!(details.ai_risk, RiskLabel::High);
        assert_eq!(details.ecg_file_path, "uploads/ecg.png");
        assert_eq!(details.notes, "");
        assert_eq!(count_kind(&fx.patient_feed(), NotificationKind::DoctorViewed), 1);
    }

    #[test]
    fn case_lists_split_by_status() {
        let fx = Fixture::new();
        let open = fx.booked(Some(0.9));
        let done = fx.booked(Some(0.1));
        let wf = fx.workflow();
        wf.complete(&done.id, &fx.doctor.id, "Fine", "Low Risk").unwrap();

        let cases = wf.open_cases(&fx.doctor.id).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].appointment_id, open.id);
        assert_eq!(cases[0].risk, RiskLabel::High);
        assert_eq!(cases[0].risk_value, Some(0.9));
        assert_eq!(cases[0].patient_name, "Sara Ali");

        let reports = wf.approved_reports(&fx.doctor.id).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].appointment_id, done.id);
        assert_eq!(reports[0].status, AppointmentStatus::Completed);
    }

    #[test]
    fn approved_doctor_listing() {
        let fx = Fixture::new();
        db::insert_doctor(&fx.conn, &Doctor {
            id: Uuid::new_v4(),
            full_name: "Pending Review".into(),
            email: None,
            is_approved: false,
        })
        .unwrap();

        let doctors = fx.workflow().approved_doctors().unwrap();
        assert_eq!(doctors, vec![DoctorListing {
            id: fx.doctor.id,
            full_name: "Imran Shah".into(),
        }]);
    }

    #[test]
    fn html_escaping() {
        assert_eq!(escape_html("<b>O'Neil & co</b>"), "&lt;b&gt;O&#39;Neil &amp; co&lt;/b&gt;");
    }

    #[test]
    fn unique_report_backstop_maps_to_conflict() {
        let fx = Fixture::new();
        let first = fx.booked(Some(0.6));

        // Skips the pre-check, as a booking that raced past it would.
        let ts = db::now();
        let racing = Appointment {
            id: Uuid::new_v4(),
            created_at: ts,
            updated_at: ts,
            ..first.clone()
        };
        let err = fx.workflow().insert_booking(&racing).unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));

        let appointments = db::list_patient_appointments(&fx.conn, &fx.patient.id).unwrap();
        assert_eq!(appointments.len(), 1);
        assert_eq!(appointments[0].id, first.id);
    }

    #[test]
    fn concurrent_views_and_bookings_resolve_once() {
        const THREADS: usize = 8;
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("race.db");
        let conn = db::open_database(&path, db::DEFAULT_BUSY_TIMEOUT).unwrap();
        let patient = fixtures::patient(&conn, "Sara Ali");
        let doctor = fixtures::doctor(&conn, "Imran Shah");
        let viewed_report = fixtures::record(&conn, patient.id, Some(0.8));
        let contested_report = fixtures::record(&conn, patient.id, Some(0.4));
        let email = EmailChannel::start(Box::new(CapturingTransport::new()), "no-reply@test", 64);
        let appt = CaseWorkflow::new(&conn, &email)
            .book(&patient.id, &doctor.id, &viewed_report.id)
            .unwrap();

        let barrier = std::sync::Barrier::new(THREADS);
        let outcomes: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        let conn = db::open_database(&path, db::DEFAULT_BUSY_TIMEOUT).unwrap();
                        let wf = CaseWorkflow::new(&conn, &email);
                        barrier.wait();
                        let view = wf.mark_viewed(&appt.id, &doctor.id).map(|a| a.status);
                        let booking = wf.book(&patient.id, &doctor.id, &contested_report.id);
                        (view, booking)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for (view, _) in &outcomes {
            assert_eq!(*view.as_ref().unwrap(), AppointmentStatus::View);
        }
        let feed = db::list_notifications(&conn, &Recipient::Patient(patient.id)).unwrap();
        assert_eq!(count_kind(&feed, NotificationKind::DoctorViewed), 1);

        let booked = outcomes.iter().filter(|(_, b)| b.is_ok()).count();
        let conflicts = outcomes
            .iter()
            .filter(|(_, b)| matches!(b, Err(WorkflowError::Conflict(_))))
            .count();
        assert_eq!(booked, 1);
        assert_eq!(conflicts, THREADS - 1);
        assert_eq!(db::list_patient_appointments(&conn, &patient.id).unwrap().len(), 2);
        let stored = db::get_ecg_record(&conn, &contested_report.id).unwrap().unwrap();
        assert_eq!(stored.consultation_status, ConsultationStatus::Done);
    }

    #[test]
    fn completion_survives_patient_lookup_failure() {
        let fx = Fixture::new();
        let appt = fx.booked(Some(0.7));
        fx.conn.execute_batch("ALTER TABLE patients RENAME TO patients_archived").unwrap();

        let done = fx
            .workflow()
            .complete(&appt.id, &fx.doctor.id, "Follow up in 3 months", "High Risk")
            .unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);

        let doctor_feed = fx.doctor_feed();
        let reviewed: Vec<_> = doctor_feed
            .iter()
            .filter(|n| n.kind == NotificationKind::PrescriptionAdded)
            .collect();
        assert_eq!(reviewed.len(), 1);
        assert_eq!(reviewed[0].message, "You have successfully reviewed the patient's case.");
    }
}
