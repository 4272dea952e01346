use chrono::Utc;
use uuid::Uuid;

/// Timestamp-derived job id: creation millis plus a short random suffix so that
/// two tabs creating a job in the same millisecond do not collide
pub fn generate_job_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_timestamp_prefixed_and_distinct() {
        let a = generate_job_id();
        let b = generate_job_id();
        assert_ne!(a, b, "Two ids differ");
        let millis: i64 = a.split('-').next().unwrap().parse().unwrap();
        assert!(millis <= Utc::now().timestamp_millis(), "Prefix is a past timestamp");
    }
}
