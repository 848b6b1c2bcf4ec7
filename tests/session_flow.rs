//! Session lifecycle against the simulated data source manager.

use std::cell::RefCell;
use std::rc::Rc;
use twain_scan::binding::SimulatedDsm;
use twain_scan::bridge::{run_pump, ScriptedPump};
use twain_scan::marshal::{Container, Value, WireType};
use twain_scan::protocol::{
    cap, ConditionCode, DataArgType, HostMessage, Identity, Message, ProtocolFlavor, Triplet,
    Version,
};
use twain_scan::session::{CapabilityQuery, ScanSettings};
use twain_scan::{BridgeSignal, ScannerSession, SessionState, StateFlags, TwainError};

const OPEN_DSM: Triplet = Triplet::control(DataArgType::Parent, Message::OpenDsm);
const CLOSE_DSM: Triplet = Triplet::control(DataArgType::Parent, Message::CloseDsm);
const GET_DEFAULT: Triplet = Triplet::control(DataArgType::Identity, Message::GetDefault);
const SET_CAPABILITY: Triplet = Triplet::control(DataArgType::Capability, Message::Set);
const ENABLE_DS: Triplet = Triplet::control(DataArgType::UserInterface, Message::EnableDs);
const PROCESS_EVENT: Triplet = Triplet::control(DataArgType::Event, Message::ProcessEvent);
const STATUS: Triplet = Triplet::control(DataArgType::Status, Message::Get);
const IMAGE_INFO: Triplet = Triplet::image(DataArgType::ImageInfo, Message::Get);
const END_XFER: Triplet = Triplet::control(DataArgType::PendingXfers, Message::EndXfer);
const RESET_XFERS: Triplet = Triplet::control(DataArgType::PendingXfers, Message::Reset);

fn app() -> Identity {
    Identity::application(
        ProtocolFlavor::Extended,
        Version {
            major: 1,
            minor: 0,
            info: "tests".to_string(),
            ..Version::default()
        },
        "Tests",
        "Session",
        "session_flow",
    )
}

fn session_with(dsm: &SimulatedDsm, settings: ScanSettings) -> ScannerSession {
    ScannerSession::new(Box::new(dsm.clone()), app(), settings, 0)
}

fn session(dsm: &SimulatedDsm) -> ScannerSession {
    session_with(dsm, ScanSettings::default())
}

fn idle() -> HostMessage {
    HostMessage::default()
}

#[test]
fn test_open_manager_lists_sources_and_default() {
    let dsm = SimulatedDsm::new(["A", "B"]).with_default(1);
    let mut session = session(&dsm);

    session.open_manager().unwrap();

    assert_eq!(session.source_names(), vec!["A", "B"]);
    assert_eq!(session.current_index(), Some(1));
    assert_eq!(session.default_source().unwrap(), Some(1));
    assert_eq!(session.flags(), StateFlags::MANAGER_OPEN);
    assert_ne!(session.application().id, 0);
    assert!(dsm.is_manager_open());
}

#[test]
fn test_open_manager_is_idempotent() {
    let dsm = SimulatedDsm::new(["A", "B"]).with_default(1);
    let mut session = session(&dsm);

    session.open_manager().unwrap();
    session.open_manager().unwrap();

    assert_eq!(session.source_names(), vec!["A", "B"]);
    assert_eq!(session.current_index(), Some(1));
    assert_eq!(dsm.call_count(OPEN_DSM), 2);
    assert_eq!(dsm.call_count(CLOSE_DSM), 1);
    assert_eq!(session.state(), SessionState::ManagerOpen);
}

#[test]
fn test_empty_source_list() {
    let dsm = SimulatedDsm::new(Vec::<String>::new());
    let mut session = session(&dsm);

    let err = session.open_manager().unwrap_err();

    assert!(matches!(err, TwainError::NoSources));
    assert!(session.flags().is_empty());
    assert!(!dsm.is_manager_open());
}

#[test]
fn test_open_manager_failure_stays_closed() {
    let dsm = SimulatedDsm::new(["A"]);
    dsm.fail_on(OPEN_DSM, ConditionCode::LowMemory);
    let mut session = session(&dsm);

    let err = session.open_manager().unwrap_err();

    assert_eq!(err.condition(), Some(ConditionCode::LowMemory));
    assert!(session.flags().is_empty());
    assert!(session.sources().is_empty());
}

#[test]
fn test_default_lookup_failure_keeps_manager_open() {
    let dsm = SimulatedDsm::new(["A", "B"]);
    dsm.fail_on(GET_DEFAULT, ConditionCode::NoDs);
    let mut session = session(&dsm);

    let err = session.open_manager().unwrap_err();

    assert!(matches!(
        err,
        TwainError::Protocol {
            operation: "OpenManager",
            condition: ConditionCode::NoDs,
            ..
        }
    ));
    assert_eq!(session.state(), SessionState::ManagerOpen);
    assert_eq!(session.source_names(), vec!["A", "B"]);
}

#[test]
fn test_select_unknown_source_keeps_selection() {
    let dsm = SimulatedDsm::new(["A", "B"]).with_default(1);
    let mut session = session(&dsm);
    session.open_manager().unwrap();

    let err = session.select_source("C").unwrap_err();
    assert!(matches!(err, TwainError::NotFound(ref name) if name == "C"));
    assert_eq!(session.current_index(), Some(1));

    let err = session.select_source(5usize).unwrap_err();
    assert!(matches!(err, TwainError::OutOfRange { index: 5, count: 2 }));
    assert_eq!(session.current_index(), Some(1));

    assert_eq!(session.select_source("A").unwrap(), 0);
    assert_eq!(session.current_source().map(|s| s.product_name.as_str()), Some("A"));
}

#[test]
fn test_set_default_source() {
    let dsm = SimulatedDsm::new(["A", "B", "C"]);
    let mut session = session(&dsm);
    session.open_manager().unwrap();

    session.set_default_source(2).unwrap();
    assert_eq!(session.default_source().unwrap(), Some(2));
    assert!(matches!(
        session.set_default_source(9),
        Err(TwainError::OutOfRange { index: 9, count: 3 })
    ));

    session.open_manager().unwrap();
    assert_eq!(session.current_index(), Some(2));
}

#[test]
fn test_end_to_end_single_page() {
    let dsm = SimulatedDsm::new(["A", "B"]).with_default(1);
    let mut session = session(&dsm);

    session.open_manager().unwrap();
    session.select_source("A").unwrap();
    session.scan().unwrap();
    assert_eq!(session.state(), SessionState::SourceEnabled);
    assert_eq!(dsm.open_source(), Some(session.sources()[0].id));

    let signal = session.process_message(&idle()).unwrap();
    assert_eq!(signal, BridgeSignal::ReadyToTransfer);

    let pages = session.drain_transfers().unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].info().width, 16);
    assert_eq!(pages[0].info().length, 8);
    assert!(session.flags().is_empty());
    assert!(!dsm.is_manager_open());
    assert_eq!(session.application().id, 0);
    assert_eq!(dsm.call_count(RESET_XFERS), 1);

    assert_eq!(dsm.live_handles(), 1);
    drop(pages);
    assert_eq!(dsm.live_handles(), 0);
}

#[test]
fn test_scan_opens_manager_on_demand() {
    let dsm = SimulatedDsm::new(["A"]);
    let mut session = session(&dsm);

    session.scan().unwrap();

    assert_eq!(session.state(), SessionState::SourceEnabled);
    assert_eq!(dsm.call_count(OPEN_DSM), 1);
}

#[test]
fn test_transfer_count_is_negotiated() {
    let dsm = SimulatedDsm::new(["Feeder"]).with_pages(5);
    let settings = ScanSettings {
        transfer_count: 2,
        ..ScanSettings::default()
    };
    let mut session = session_with(&dsm, settings);

    session.scan().unwrap();
    assert_eq!(
        dsm.capability(cap::XFER_COUNT),
        Some(Container::one(WireType::Int16, Value::Int16(2)))
    );
    assert_eq!(session.process_message(&idle()).unwrap(), BridgeSignal::ReadyToTransfer);

    let pages = session.drain_transfers().unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(dsm.call_count(END_XFER), 2);
}

#[test]
fn test_all_pages_transfer() {
    let dsm = SimulatedDsm::new(["Feeder"]).with_pages(3);
    let settings = ScanSettings {
        transfer_count: -1,
        ..ScanSettings::default()
    };
    let mut session = session_with(&dsm, settings);

    session.scan().unwrap();
    session.process_message(&idle()).unwrap();
    let pages = session.drain_transfers().unwrap();

    assert_eq!(pages.len(), 3);
    let handles: Vec<usize> = pages.iter().map(|p| p.handle()).collect();
    assert!(handles.windows(2).all(|w| w[0] != w[1]));
    assert_eq!(dsm.live_handles(), 3);
}

#[test]
fn test_capability_failure_closes_source() {
    let dsm = SimulatedDsm::new(["A"]);
    dsm.fail_on(SET_CAPABILITY, ConditionCode::BadValue);
    let mut session = session(&dsm);

    let err = session.scan().unwrap_err();

    assert_eq!(err.condition(), Some(ConditionCode::BadValue));
    assert!(matches!(
        err,
        TwainError::Protocol {
            operation: "SetCapability",
            ..
        }
    ));
    assert_eq!(session.state(), SessionState::ManagerOpen);
    assert!(!session.flags().contains(StateFlags::SOURCE_OPEN));
    assert_eq!(dsm.open_source(), None);
    assert!(dsm.is_manager_open());
    assert_eq!(dsm.call_count(ENABLE_DS), 0);
}

#[test]
fn test_enable_failure_closes_source() {
    let dsm = SimulatedDsm::new(["A"]);
    dsm.fail_on(ENABLE_DS, ConditionCode::CheckDeviceOnline);
    let mut session = session(&dsm);

    let err = session.scan().unwrap_err();

    assert_eq!(err.condition(), Some(ConditionCode::CheckDeviceOnline));
    assert_eq!(session.state(), SessionState::ManagerOpen);
    assert_eq!(dsm.open_source(), None);

    dsm.clear_failures();
    session.scan().unwrap();
    assert_eq!(session.state(), SessionState::SourceEnabled);
}

#[test]
fn test_transfer_abort_returns_partial_pages() {
    let dsm = SimulatedDsm::new(["Feeder"]).with_pages(3);
    dsm.fail_after(IMAGE_INFO, 2, ConditionCode::PaperJam);
    let settings = ScanSettings {
        transfer_count: -1,
        ..ScanSettings::default()
    };
    let mut session = session_with(&dsm, settings);

    session.scan().unwrap();
    session.process_message(&idle()).unwrap();
    let pages = session.drain_transfers().unwrap();

    assert_eq!(pages.len(), 2);
    assert!(session.flags().is_empty());
    assert!(!dsm.is_manager_open());
    assert_eq!(dsm.call_count(RESET_XFERS), 1);
}

#[test]
fn test_end_transfer_failure_tears_down() {
    let dsm = SimulatedDsm::new(["Flatbed"]);
    dsm.fail_on(END_XFER, ConditionCode::PaperJam);
    let mut session = session(&dsm);

    session.scan().unwrap();
    assert_eq!(session.process_message(&idle()).unwrap(), BridgeSignal::ReadyToTransfer);
    let pages = session.drain_transfers().unwrap();

    assert!(pages.is_empty());
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.flags().is_empty());
    assert!(!dsm.is_enabled());
    assert_eq!(dsm.open_source(), None);
    assert!(!dsm.is_manager_open());
    assert_eq!(dsm.call_count(RESET_XFERS), 1);
    assert_eq!(dsm.live_handles(), 0);
}

#[test]
fn test_cancelled_transfer_releases_bitmap() {
    let dsm = SimulatedDsm::new(["Feeder"])
        .with_pages(3)
        .with_cancelled_page(1);
    let settings = ScanSettings {
        transfer_count: -1,
        ..ScanSettings::default()
    };
    let mut session = session_with(&dsm, settings);

    session.scan().unwrap();
    session.process_message(&idle()).unwrap();
    let pages = session.drain_transfers().unwrap();

    assert_eq!(pages.len(), 1);
    assert!(session.flags().is_empty());
    assert!(!dsm.is_manager_open());
    assert_eq!(dsm.call_count(END_XFER), 1);
    assert_eq!(dsm.live_handles(), 1);
    drop(pages);
    assert_eq!(dsm.live_handles(), 0);
}

#[test]
fn test_drain_requires_enabled_source() {
    let dsm = SimulatedDsm::new(["A"]);
    let mut session = session(&dsm);
    session.open_manager().unwrap();

    let err = session.drain_transfers().unwrap_err();
    assert!(matches!(err, TwainError::InvalidTransition { .. }));
    assert!(err.is_sequencing());
    assert_eq!(session.state(), SessionState::ManagerOpen);
}

#[test]
fn test_observer_sees_consistent_flags() {
    let dsm = SimulatedDsm::new(["A"]);
    let mut session = session(&dsm);
    let seen: Rc<RefCell<Vec<(SessionState, SessionState)>>> = Rc::default();
    let log = Rc::clone(&seen);
    session.set_transition_observer(move |from, to| log.borrow_mut().push((from, to)));

    session.scan().unwrap();
    session.process_message(&idle()).unwrap();
    session.drain_transfers().unwrap();

    let seen = seen.borrow();
    assert!(seen.iter().all(|(from, to)| {
        from.flags().is_consistent() && to.flags().is_consistent()
    }));
    let states: Vec<SessionState> = seen.iter().map(|(_, to)| *to).collect();
    assert_eq!(
        states,
        vec![
            SessionState::ManagerOpen,
            SessionState::SourceOpen { ready: false },
            SessionState::SourceOpen { ready: true },
            SessionState::SourceEnabled,
            SessionState::Transferring,
            SessionState::SourceEnabled,
            SessionState::SourceOpen { ready: true },
            SessionState::ManagerOpen,
            SessionState::Closed,
        ]
    );
}

#[test]
fn test_capability_queries() {
    let dsm = SimulatedDsm::new(["A"]);
    let mut session = session(&dsm);
    session.open_selected_source().unwrap();

    let all = session
        .get_capability(cap::X_RESOLUTION, CapabilityQuery::All)
        .unwrap();
    assert!(matches!(all, Container::Range { .. }));
    assert_eq!(all.current(), Some(&Value::Real(300.0)));

    let pixel = session
        .get_capability(cap::PIXEL_TYPE, CapabilityQuery::Default)
        .unwrap();
    assert_eq!(pixel, Container::one(WireType::UInt16, Value::UInt16(2)));

    session
        .set_capability(
            cap::PIXEL_TYPE,
            &Container::one(WireType::UInt16, Value::UInt16(0)),
        )
        .unwrap();
    let current = session
        .get_capability(cap::PIXEL_TYPE, CapabilityQuery::Current)
        .unwrap();
    assert_eq!(current.current(), Some(&Value::UInt16(0)));

    let err = session
        .get_capability(cap::CAPTION, CapabilityQuery::All)
        .unwrap_err();
    assert_eq!(err.condition(), Some(ConditionCode::CapUnsupported));
}

#[test]
fn test_capability_requires_open_source() {
    let dsm = SimulatedDsm::new(["A"]);
    let mut session = session(&dsm);
    session.open_manager().unwrap();

    let err = session
        .get_capability(cap::XFER_COUNT, CapabilityQuery::All)
        .unwrap_err();
    assert!(matches!(err, TwainError::InvalidTransition { .. }));
}

#[test]
fn test_bridge_without_open_source() {
    let dsm = SimulatedDsm::new(["A"]);
    let mut session = session(&dsm);

    assert_eq!(session.process_message(&idle()).unwrap(), BridgeSignal::Unhandled);
    session.open_manager().unwrap();
    assert_eq!(session.process_message(&idle()).unwrap(), BridgeSignal::Unhandled);
    assert_eq!(dsm.call_count(PROCESS_EVENT), 0);
}

#[test]
fn test_bridge_close_request_closes_source() {
    let dsm = SimulatedDsm::new(["A"]).with_events([Message::CloseDsReq]);
    let mut session = session(&dsm);
    session.scan().unwrap();

    let signal = session.process_message(&idle()).unwrap();

    assert_eq!(signal, BridgeSignal::CloseRequested);
    assert_eq!(session.state(), SessionState::ManagerOpen);
    assert_eq!(dsm.open_source(), None);
    assert_eq!(session.process_message(&idle()).unwrap(), BridgeSignal::Unhandled);
}

#[test]
fn test_bridge_signal_mapping() {
    let dsm = SimulatedDsm::new(["A"]).with_events([
        Message::DeviceEvent,
        Message::Null,
        Message::CloseDsOk,
    ]);
    let mut session = session(&dsm);
    session.scan().unwrap();

    assert_eq!(session.process_message(&idle()).unwrap(), BridgeSignal::DeviceEvent);
    assert_eq!(session.process_message(&idle()).unwrap(), BridgeSignal::Nothing);
    assert_eq!(session.process_message(&idle()).unwrap(), BridgeSignal::Closed);
    assert_eq!(session.process_message(&idle()).unwrap(), BridgeSignal::Unhandled);
}

#[test]
fn test_bridge_failure_is_consumed_and_reported() {
    let dsm = SimulatedDsm::new(["A"]);
    let mut session = session(&dsm);
    session.scan().unwrap();
    dsm.fail_on(PROCESS_EVENT, ConditionCode::OperationError);

    let signal = session.process_message(&idle()).unwrap();

    assert_eq!(signal, BridgeSignal::Nothing);
    assert_eq!(dsm.call_count(STATUS), 1);
    assert_eq!(session.state(), SessionState::SourceEnabled);

    dsm.clear_failures();
    assert_eq!(session.process_message(&idle()).unwrap(), BridgeSignal::ReadyToTransfer);
}

#[test]
fn test_pump_runs_until_ready() {
    let dsm = SimulatedDsm::new(["A"]).with_events([
        Message::DeviceEvent,
        Message::Null,
        Message::XferReady,
    ]);
    let mut session = session(&dsm);
    session.scan().unwrap();

    let mut pump = ScriptedPump::new(vec![idle(); 5]);
    let signal = run_pump(&mut pump, &mut session).unwrap();

    assert_eq!(signal, Some(BridgeSignal::ReadyToTransfer));
    assert!(pump.dispatched().is_empty());
    assert_eq!(dsm.call_count(PROCESS_EVENT), 3);
}

#[test]
fn test_drop_closes_everything() {
    let dsm = SimulatedDsm::new(["A"]);
    {
        let mut session = session(&dsm);
        session.scan().unwrap();
        assert!(dsm.is_enabled());
    }
    assert!(!dsm.is_enabled());
    assert_eq!(dsm.open_source(), None);
    assert!(!dsm.is_manager_open());
}
