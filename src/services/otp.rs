use chrono::NaiveDateTime;
use rand::Rng;
use uuid::Uuid;

use crate::services::db_models::Otp;
use crate::types::{CoreError, OTP_MAX_ATTEMPTS};

/// Fresh 6-digit numeric code, zero-padded.
pub fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

/// Opaque session identifier correlating an OTP across request boundaries.
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Rows a fresh issue retires: every code for the phone that is still
/// live. Already-verified rows (used or previously superseded) are left
/// alone, so a repeated issue is idempotent over them.
pub fn superseded_ids(existing: &[Otp]) -> Vec<i64> {
    existing
        .iter()
        .filter(|record| !record.is_verified)
        .map(|record| record.id)
        .collect()
}

#[derive(Debug, PartialEq, Eq)]
pub enum OtpRejection {
    Expired,
    AlreadyUsed,
    TooManyAttempts,
}

impl OtpRejection {
    pub fn message(&self) -> &'static str {
        match self {
            OtpRejection::Expired => "code has expired, request a new one",
            OtpRejection::AlreadyUsed => "code has already been used",
            OtpRejection::TooManyAttempts => "too many attempts, request a new code",
        }
    }
}

impl From<OtpRejection> for CoreError {
    fn from(rejection: OtpRejection) -> Self {
        CoreError::Conflict(rejection.message().into())
    }
}

/// Gate checks that run before the attempt counter is touched. The counter
/// itself is incremented once per verify call and only then is the code
/// compared, so a correct code on the 5th attempt still lands on
/// attempts=5 and succeeds, while any 6th call is rejected purely by count.
pub fn precheck(
    is_verified: bool,
    expires_at: NaiveDateTime,
    attempts: i32,
    now: NaiveDateTime,
) -> Option<OtpRejection> {
    if now >= expires_at {
        return Some(OtpRejection::Expired);
    }
    if is_verified {
        return Some(OtpRejection::AlreadyUsed);
    }
    if attempts >= OTP_MAX_ATTEMPTS {
        return Some(OtpRejection::TooManyAttempts);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap()
    }

    fn live_expiry() -> NaiveDateTime {
        now() + Duration::minutes(10)
    }

    #[test]
    fn codes_are_six_zero_padded_digits() {
        for _ in 0..500 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()), "bad code {code}");
        }
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(new_session_id(), new_session_id());
    }

    #[test]
    fn fresh_otp_passes_precheck() {
        assert_eq!(precheck(false, live_expiry(), 0, now()), None);
    }

    #[test]
    fn expiry_wins_over_every_other_rejection() {
        let past = now() - Duration::seconds(1);
        assert_eq!(precheck(true, past, 9, now()), Some(OtpRejection::Expired));
    }

    #[test]
    fn verified_otp_is_already_used() {
        assert_eq!(
            precheck(true, live_expiry(), 0, now()),
            Some(OtpRejection::AlreadyUsed)
        );
    }

    #[test]
    fn expires_exactly_at_the_deadline() {
        assert_eq!(
            precheck(false, now(), 0, now()),
            Some(OtpRejection::Expired)
        );
    }

    #[derive(Debug, PartialEq)]
    enum Outcome {
        Verified,
        Mismatch,
        Rejected(OtpRejection),
    }

    /// Mirrors the verify sequence the database handler runs: precheck,
    /// increment the counter, compare the code.
    fn run_verify(attempts: &mut i32, stored: &str, submitted: &str) -> Outcome {
        if let Some(rejection) = precheck(false, live_expiry(), *attempts, now()) {
            return Outcome::Rejected(rejection);
        }
        *attempts += 1;
        if stored == submitted {
            Outcome::Verified
        } else {
            Outcome::Mismatch
        }
    }

    #[test]
    fn sixth_call_is_rejected_even_with_the_right_code() {
        let mut attempts = 0;
        for _ in 0..5 {
            assert_eq!(run_verify(&mut attempts, "123456", "000000"), Outcome::Mismatch);
        }
        assert_eq!(attempts, 5);
        assert_eq!(
            run_verify(&mut attempts, "123456", "123456"),
            Outcome::Rejected(OtpRejection::TooManyAttempts)
        );
        assert_eq!(attempts, 5);
    }

    #[test]
    fn correct_code_on_the_fifth_attempt_still_succeeds() {
        let mut attempts = 0;
        for _ in 0..4 {
            assert_eq!(run_verify(&mut attempts, "123456", "000000"), Outcome::Mismatch);
        }
        assert_eq!(run_verify(&mut attempts, "123456", "123456"), Outcome::Verified);
        assert_eq!(attempts, 5);
    }

    fn otp_row(id: i64, is_verified: bool) -> Otp {
        Otp {
            id,
            phone: "+35699000001".into(),
            code: generate_code(),
            session_id: new_session_id(),
            reservation_id: None,
            is_verified,
            expires_at: live_expiry(),
            attempts: 0,
            created_at: now(),
        }
    }

    /// Mirrors the issue sequence the database handler runs: retire the
    /// phone's live codes, then insert a fresh one.
    fn issue(rows: &mut Vec<Otp>) -> String {
        for retired in superseded_ids(rows) {
            rows.iter_mut().find(|r| r.id == retired).unwrap().is_verified = true;
        }
        let fresh = otp_row(rows.len() as i64 + 1, false);
        let session = fresh.session_id.clone();
        rows.push(fresh);
        session
    }

    #[test]
    fn issuing_a_second_code_retires_the_first() {
        let mut rows = vec![];
        let first_session = issue(&mut rows);
        let second_session = issue(&mut rows);

        let first = rows.iter().find(|r| r.session_id == first_session).unwrap();
        let second = rows.iter().find(|r| r.session_id == second_session).unwrap();
        assert!(first.is_verified, "superseded code must be retired");
        assert!(!second.is_verified, "the fresh code must stay live");
    }

    #[test]
    fn already_used_codes_are_not_reselected() {
        let rows = vec![otp_row(1, true), otp_row(2, true), otp_row(3, false)];
        assert_eq!(superseded_ids(&rows), vec![3]);
    }

    #[test]
    fn a_phone_with_no_live_code_retires_nothing() {
        assert!(superseded_ids(&[]).is_empty());
        assert!(superseded_ids(&[otp_row(1, true)]).is_empty());
    }
}
