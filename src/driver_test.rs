use super::*;

#[test]
fn test_fault_classification() {
    assert!(matches!(
        DriverFault::classify("stale element reference: element is not attached"),
        DriverFault::StaleReference(_)
    ));
    assert!(matches!(
        DriverFault::classify("no such window: target window already closed"),
        DriverFault::NoSuchWindow(_)
    ));
    assert!(matches!(
        DriverFault::classify("No such frame"),
        DriverFault::NoSuchFrame(_)
    ));
    assert!(matches!(
        DriverFault::classify("Unable to locate element: //div"),
        DriverFault::NotFound(_)
    ));
    assert!(matches!(
        DriverFault::classify("script timeout"),
        DriverFault::Timeout(_)
    ));
    assert!(matches!(
        DriverFault::classify("invalid session id"),
        DriverFault::Session(_)
    ));
}

#[test]
fn test_malformed_selector_is_not_a_session_fault() {
    for message in [
        "invalid selector: Unable to evaluate //div[ as an XPath expression",
        "invalid argument: 'value' must be a string",
        "SyntaxError: invalid expression",
    ] {
        let fault = DriverFault::classify(message);
        assert!(matches!(fault, DriverFault::InvalidSelector(_)), "{}", message);
        assert!(!fault.is_session_level());
    }

    let fault = DriverFault::classify("javascript error: foo is not defined");
    assert!(matches!(fault, DriverFault::Script(_)));
    assert!(!fault.is_session_level());
}

#[test]
fn test_frame_listing_uses_the_entry_selector() {
    assert!(LIST_FRAMES_SCRIPT.contains(&format!("querySelectorAll('{}')", FRAME_ELEMENTS)));
}

#[test]
fn test_session_level_faults() {
    assert!(DriverFault::Session("gone".into()).is_session_level());
    assert!(DriverFault::NoSuchWindow("gone".into()).is_session_level());
    assert!(!DriverFault::NotFound("//a".into()).is_session_level());
    assert!(!DriverFault::NoSuchFrame("x".into()).is_session_level());
}

#[test]
fn test_frame_identifier_precedence() {
    let by_id = FrameDescriptor {
        index: 0,
        id: "ifrmSeat".into(),
        name: "seat".into(),
    };
    assert_eq!(by_id.identifier(), "ifrmSeat");
    assert!(by_id.matches("ifrmSeat"));
    assert!(by_id.matches("seat"));
    assert!(by_id.matches("index=0"));

    let by_name = FrameDescriptor {
        index: 1,
        id: String::new(),
        name: "content".into(),
    };
    assert_eq!(by_name.identifier(), "content");

    let anonymous = FrameDescriptor {
        index: 2,
        ..Default::default()
    };
    assert_eq!(anonymous.identifier(), "index=2");
    assert!(!anonymous.matches(""));
}
