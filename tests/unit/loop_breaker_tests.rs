use chrono::{Duration, TimeZone, Utc};

use chat_orchestrator::models::session::ChatSession;
use chat_orchestrator::orchestrator::loop_breaker::loop_breaker_payload;

#[test]
fn payload_describes_session_state() {
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let mut session = ChatSession::new("executor".into(), "build".into(), t0);
    session.message_count = 12;
    session.error_count = 1;
    session.last_activity_at = t0 + Duration::seconds(60);

    let payload = loop_breaker_payload(&session, t0 + Duration::seconds(90));

    assert!(payload.contains(&session.id));
    assert!(payload.contains("Role: executor"));
    assert!(payload.contains("Runtime: 90.0 seconds (1.5 minutes)"));
    assert!(payload.contains("Message count: 12"));
    assert!(payload.contains("Error count: 1"));
    assert!(payload.contains("Last activity: 30.0 seconds ago"));
}

#[test]
fn payload_lists_corrective_steps_in_order() {
    let session = ChatSession::new("executor".into(), "build".into(), Utc::now());
    let payload = loop_breaker_payload(&session, Utc::now());

    let positions: Vec<usize> = ["STOP", "SUMMARIZE", "IDENTIFY", "PROPOSE", "[[NEEDS-HUMAN-REVIEW]]"]
        .iter()
        .map(|step| payload.find(step).expect("step present"))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}
