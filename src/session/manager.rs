//! The scanner session: owns the manager connection, the source list and the
//! selection, and drives the open/negotiate/enable/transfer/close sequence.

use super::state::{SessionState, StateFlags};
use crate::binding::{CapabilityPayload, DsmEntry, NativeBitmap, Payload};
use crate::config::ScanConfig;
use crate::error::{TwainError, TwainResult};
use crate::marshal::{Container, ContainerKind, Value, WireType};
use crate::protocol::{
    cap, ConditionCode, DataArgType, EventRecord, Identity, ImageInfo, Message, PendingXfers,
    ReturnCode, Status, Triplet, UserInterface, Version,
};
use std::fmt;
use tracing::{debug, info, warn};

const OPEN_DSM: Triplet = Triplet::control(DataArgType::Parent, Message::OpenDsm);
const CLOSE_DSM: Triplet = Triplet::control(DataArgType::Parent, Message::CloseDsm);
const GET_FIRST: Triplet = Triplet::control(DataArgType::Identity, Message::GetFirst);
const GET_NEXT: Triplet = Triplet::control(DataArgType::Identity, Message::GetNext);
const GET_DEFAULT: Triplet = Triplet::control(DataArgType::Identity, Message::GetDefault);
const SET_DEFAULT: Triplet = Triplet::control(DataArgType::Identity, Message::Set);
const OPEN_DS: Triplet = Triplet::control(DataArgType::Identity, Message::OpenDs);
const CLOSE_DS: Triplet = Triplet::control(DataArgType::Identity, Message::CloseDs);
const ENABLE_DS: Triplet = Triplet::control(DataArgType::UserInterface, Message::EnableDs);
const DISABLE_DS: Triplet = Triplet::control(DataArgType::UserInterface, Message::DisableDs);
const SET_CAPABILITY: Triplet = Triplet::control(DataArgType::Capability, Message::Set);
const STATUS: Triplet = Triplet::control(DataArgType::Status, Message::Get);
const IMAGE_INFO: Triplet = Triplet::image(DataArgType::ImageInfo, Message::Get);
const NATIVE_XFER: Triplet = Triplet::image(DataArgType::ImageNativeXfer, Message::Get);
const END_XFER: Triplet = Triplet::control(DataArgType::PendingXfers, Message::EndXfer);
const RESET_XFERS: Triplet = Triplet::control(DataArgType::PendingXfers, Message::Reset);

/// How to pick a source from the enumerated list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelector {
    /// Position in enumeration order.
    Index(usize),
    /// Manager-assigned identifier.
    Id(u32),
    /// Exact product name.
    Name(String),
}

impl From<usize> for SourceSelector {
    fn from(index: usize) -> Self {
        SourceSelector::Index(index)
    }
}

impl From<&str> for SourceSelector {
    fn from(name: &str) -> Self {
        SourceSelector::Name(name.to_string())
    }
}

impl From<String> for SourceSelector {
    fn from(name: String) -> Self {
        SourceSelector::Name(name)
    }
}

/// Which value of a capability to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityQuery {
    /// Everything the source supports.
    All,
    /// The value in effect now.
    Current,
    /// The value the source falls back to on reset.
    Default,
}

impl CapabilityQuery {
    fn message(self) -> Message {
        match self {
            CapabilityQuery::All => Message::Get,
            CapabilityQuery::Current => Message::GetCurrent,
            CapabilityQuery::Default => Message::GetDefault,
        }
    }
}

/// Scan parameters negotiated with every source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// Pages to transfer; -1 for every page the source has.
    pub transfer_count: i16,
    /// Show the source's own user interface.
    pub show_ui: bool,
    /// Run that interface modally.
    pub modal_ui: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            transfer_count: 1,
            show_ui: false,
            modal_ui: true,
        }
    }
}

type TransitionObserver = Box<dyn FnMut(SessionState, SessionState)>;

/// One application's connection to the data source manager.
///
/// Not re-entrant: every call blocks until the manager answers, and the
/// event bridge must run on the thread that owns the host message pump.
pub struct ScannerSession {
    pub(crate) dsm: Box<dyn DsmEntry>,
    pub(crate) app: Identity,
    pub(crate) sources: Vec<Identity>,
    pub(crate) current: Option<usize>,
    /// Identity of the source currently open, as returned by the manager.
    pub(crate) active: Option<Identity>,
    pub(crate) state: SessionState,
    pub(crate) event: EventRecord,
    parent: usize,
    settings: ScanSettings,
    observer: Option<TransitionObserver>,
}

impl fmt::Debug for ScannerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannerSession")
            .field("state", &self.state)
            .field("sources", &self.source_names())
            .field("current", &self.current)
            .finish()
    }
}

impl ScannerSession {
    /// Create a closed session. `parent` is the host window handle handed to
    /// the manager and to enabled sources.
    pub fn new(dsm: Box<dyn DsmEntry>, app: Identity, settings: ScanSettings, parent: usize) -> Self {
        Self {
            dsm,
            app,
            sources: Vec::new(),
            current: None,
            active: None,
            state: SessionState::Closed,
            event: EventRecord::default(),
            parent,
            settings,
            observer: None,
        }
    }

    /// Create a session with identity and scan settings taken from `config`.
    pub fn from_config(dsm: Box<dyn DsmEntry>, config: &ScanConfig, parent: usize) -> Self {
        let application = &config.application;
        let app = Identity::application(
            dsm.flavor(),
            Version {
                major: application.version_major,
                minor: application.version_minor,
                language: application.language,
                country: application.country,
                info: application.version_info.clone(),
            },
            application.manufacturer.clone(),
            application.product_family.clone(),
            application.product_name.clone(),
        );
        let settings = ScanSettings {
            transfer_count: config.session.transfer_count,
            show_ui: config.session.show_ui,
            modal_ui: config.session.modal_ui,
        };
        Self::new(dsm, app, settings, parent)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Current protocol state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Observable flags of the current state.
    pub fn flags(&self) -> StateFlags {
        self.state.flags()
    }

    /// The application identity, with the id the manager assigned.
    pub fn application(&self) -> &Identity {
        &self.app
    }

    /// Sources found by the last enumeration, in enumeration order.
    pub fn sources(&self) -> &[Identity] {
        &self.sources
    }

    /// Product names of the enumerated sources.
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.product_name.clone()).collect()
    }

    /// Index of the selected source in [`Self::sources`].
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// The selected source, if any.
    pub fn current_source(&self) -> Option<&Identity> {
        self.current.and_then(|i| self.sources.get(i))
    }

    /// Settings negotiated on every scan.
    pub fn settings(&self) -> ScanSettings {
        self.settings
    }

    /// Call `observer(from, to)` on every state change.
    pub fn set_transition_observer(&mut self, observer: impl FnMut(SessionState, SessionState) + 'static) {
        self.observer = Some(Box::new(observer));
    }

    // =========================================================================
    // Manager
    // =========================================================================

    /// Open the manager, enumerate sources and select the default source.
    ///
    /// Any existing session is torn down first, so calling this twice yields
    /// the same list and selection.
    pub fn open_manager(&mut self) -> TwainResult<()> {
        self.close_manager()?;

        let mut parent = self.parent;
        let rc = self.dsm.entry(&mut self.app, None, OPEN_DSM, Payload::Parent(&mut parent));
        debug!(triplet = %OPEN_DSM, code = ?rc, "dispatch");
        if !rc.is_success() {
            return Err(self.protocol_error("OpenManager", rc));
        }
        self.advance(SessionState::open_manager)?;
        info!(app_id = self.app.id, "data source manager opened");

        self.enumerate_sources()?;
        if self.sources.is_empty() {
            if let Err(cleanup) = self.close_manager() {
                warn!(error = %cleanup, "closing manager after empty enumeration failed");
            }
            return Err(TwainError::NoSources);
        }

        self.current = self.query_default("OpenManager")?;
        Ok(())
    }

    /// Rebuild the source list from the manager.
    ///
    /// A selection survives re-enumeration when its source is still listed.
    pub fn enumerate_sources(&mut self) -> TwainResult<&[Identity]> {
        if !self.state.is_manager_open() {
            return Err(TwainError::InvalidTransition {
                from: self.state.to_string(),
                event: "enumerate sources".to_string(),
            });
        }

        let selected = self.current_source().map(|s| s.id);
        let mut found = Vec::new();
        let mut triplet = GET_FIRST;
        loop {
            let mut identity = Identity::default();
            let rc = self
                .dsm
                .entry(&mut self.app, None, triplet, Payload::Identity(&mut identity));
            debug!(%triplet, code = ?rc, "dispatch");
            match rc {
                ReturnCode::Success => found.push(identity),
                ReturnCode::EndOfList => break,
                other => return Err(self.protocol_error("EnumerateSources", other)),
            }
            triplet = GET_NEXT;
        }

        info!(count = found.len(), "sources enumerated");
        self.sources = found;
        self.current = selected.and_then(|id| self.sources.iter().position(|s| s.id == id));
        Ok(&self.sources)
    }

    /// Index of the manager's default source in the owned list, if listed.
    pub fn default_source(&mut self) -> TwainResult<Option<usize>> {
        self.query_default("DefaultSource")
    }

    fn query_default(&mut self, operation: &'static str) -> TwainResult<Option<usize>> {
        let mut identity = Identity::default();
        let rc = self
            .dsm
            .entry(&mut self.app, None, GET_DEFAULT, Payload::Identity(&mut identity));
        debug!(triplet = %GET_DEFAULT, code = ?rc, "dispatch");
        if !rc.is_success() {
            return Err(self.protocol_error(operation, rc));
        }
        Ok(self.sources.iter().position(|s| *s == identity))
    }

    /// Make the source at `index` the manager's default.
    pub fn set_default_source(&mut self, index: usize) -> TwainResult<()> {
        let mut identity = self
            .sources
            .get(index)
            .cloned()
            .ok_or(TwainError::OutOfRange {
                index,
                count: self.sources.len(),
            })?;
        let rc = self
            .dsm
            .entry(&mut self.app, None, SET_DEFAULT, Payload::Identity(&mut identity));
        debug!(triplet = %SET_DEFAULT, code = ?rc, "dispatch");
        if !rc.is_success() {
            return Err(self.protocol_error("SetDefaultSource", rc));
        }
        Ok(())
    }

    /// Select the source later scans use. Local only; no protocol call.
    pub fn select_source(&mut self, selector: impl Into<SourceSelector>) -> TwainResult<usize> {
        let index = match selector.into() {
            SourceSelector::Index(index) => {
                if index >= self.sources.len() {
                    return Err(TwainError::OutOfRange {
                        index,
                        count: self.sources.len(),
                    });
                }
                index
            }
            SourceSelector::Id(id) => self
                .sources
                .iter()
                .position(|s| s.id == id)
                .ok_or_else(|| TwainError::NotFound(format!("id {}", id)))?,
            SourceSelector::Name(name) => self
                .sources
                .iter()
                .position(|s| s.product_name == name)
                .ok_or(TwainError::NotFound(name))?,
        };
        self.current = Some(index);
        Ok(index)
    }

    // =========================================================================
    // Source
    // =========================================================================

    /// Open the selected source, negotiate the transfer count and enable it
    /// without UI.
    ///
    /// Opens the manager first if needed. A failure after the source is open
    /// closes the source and leaves the manager open.
    pub fn scan(&mut self) -> TwainResult<()> {
        if !self.state.is_manager_open() {
            self.open_manager()?;
        }
        let index = self.current.ok_or(TwainError::NoSourceSelected)?;
        self.open_source(index)?;

        let count = Container::one(WireType::Int16, Value::Int16(self.settings.transfer_count));
        if let Err(err) = self.set_capability(cap::XFER_COUNT, &count) {
            self.recover_source(&err);
            return Err(err);
        }
        self.advance(SessionState::mark_ready)?;

        if let Err(err) = self.enable_source() {
            self.recover_source(&err);
            return Err(err);
        }
        Ok(())
    }

    fn open_source(&mut self, index: usize) -> TwainResult<()> {
        self.close_source()?;
        let mut identity = self
            .sources
            .get(index)
            .cloned()
            .ok_or(TwainError::OutOfRange {
                index,
                count: self.sources.len(),
            })?;

        let rc = self
            .dsm
            .entry(&mut self.app, None, OPEN_DS, Payload::Identity(&mut identity));
        debug!(triplet = %OPEN_DS, code = ?rc, "dispatch");
        if !rc.is_success() {
            return Err(self.protocol_error("OpenSource", rc));
        }
        info!(source = %identity.product_name, "source opened");
        self.active = Some(identity);
        self.advance(SessionState::open_source)
    }

    fn enable_source(&mut self) -> TwainResult<()> {
        let mut ui = UserInterface {
            show_ui: self.settings.show_ui,
            modal_ui: self.settings.modal_ui,
            parent: self.parent,
        };
        let rc = self.dispatch_to_source(ENABLE_DS, Payload::UserInterface(&mut ui));
        if !rc.is_success() {
            return Err(self.protocol_error("EnableSource", rc));
        }
        info!("source enabled");
        self.advance(SessionState::enable)
    }

    /// Set one capability on the open source. The source must not be enabled.
    pub fn set_capability(&mut self, cap_id: u16, container: &Container) -> TwainResult<()> {
        if !matches!(self.state, SessionState::SourceOpen { .. }) {
            return Err(TwainError::InvalidTransition {
                from: self.state.to_string(),
                event: format!("set {}", cap::name(cap_id)),
            });
        }
        let mut record = CapabilityPayload {
            cap: cap_id,
            kind: container.kind().code(),
            data: container.encode()?,
        };
        let rc = self.dispatch_to_source(SET_CAPABILITY, Payload::Capability(&mut record));
        if !rc.is_success() {
            return Err(self.protocol_error("SetCapability", rc));
        }
        debug!(capability = cap::name(cap_id), "capability set");
        Ok(())
    }

    /// Query one capability of the open source.
    pub fn get_capability(&mut self, cap_id: u16, query: CapabilityQuery) -> TwainResult<Container> {
        if !self.state.is_source_open() {
            return Err(TwainError::InvalidTransition {
                from: self.state.to_string(),
                event: format!("query {}", cap::name(cap_id)),
            });
        }
        let mut record = CapabilityPayload::query(cap_id);
        let triplet = Triplet::control(DataArgType::Capability, query.message());
        let rc = self.dispatch_to_source(triplet, Payload::Capability(&mut record));
        if !rc.is_success() {
            return Err(self.protocol_error("GetCapability", rc));
        }
        let kind = ContainerKind::from_code(record.kind)?;
        Container::decode(kind, &record.data)
    }

    /// Open the selected source for capability queries only.
    pub fn open_selected_source(&mut self) -> TwainResult<()> {
        if !self.state.is_manager_open() {
            self.open_manager()?;
        }
        let index = self.current.ok_or(TwainError::NoSourceSelected)?;
        self.open_source(index)
    }

    // =========================================================================
    // Transfer
    // =========================================================================

    /// Transfer every pending page, then close the manager.
    ///
    /// Returns the pages collected. When a stage of the loop fails, the loop
    /// stops and the pages transferred before the failure are returned.
    /// Pending transfers are reset on every exit from the loop so the source
    /// can be disabled and the session torn down.
    pub fn drain_transfers(&mut self) -> TwainResult<Vec<NativeBitmap>> {
        self.advance(SessionState::begin_transfer)?;
        let memory = self.dsm.memory();
        let mut pages = Vec::new();

        let completed = loop {
            let mut image_info = ImageInfo::default();
            let rc = self.dispatch_to_source(IMAGE_INFO, Payload::ImageInfo(&mut image_info));
            if !rc.is_success() {
                self.log_abort("ImageInfo", rc);
                break false;
            }

            let mut handle = 0usize;
            let rc = self.dispatch_to_source(NATIVE_XFER, Payload::NativeXfer(&mut handle));
            if rc != ReturnCode::XferDone {
                if handle != 0 {
                    drop(NativeBitmap::new(handle, image_info, memory.clone()));
                }
                self.log_abort("NativeTransfer", rc);
                break false;
            }
            let page = NativeBitmap::new(handle, image_info, memory.clone());

            let mut pending = PendingXfers::default();
            let rc = self.dispatch_to_source(END_XFER, Payload::PendingXfers(&mut pending));
            if !rc.is_success() {
                self.log_abort("EndTransfer", rc);
                break false;
            }

            debug!(
                page = pages.len(),
                width = image_info.width,
                length = image_info.length,
                remaining = pending.count,
                "page transferred"
            );
            pages.push(page);
            if pending.count == 0 {
                break true;
            }
        };

        let mut pending = PendingXfers::default();
        let rc = self.dispatch_to_source(RESET_XFERS, Payload::PendingXfers(&mut pending));
        if rc.is_success() {
            if let Err(err) = self.advance(SessionState::reset_transfers) {
                warn!(error = %err, "leaving transfer loop failed");
            }
        } else {
            warn!(code = ?rc, completed, "pending transfer reset not accepted");
        }

        if let Err(err) = self.close_manager() {
            warn!(error = %err, "teardown after transfer failed");
        }
        info!(pages = pages.len(), completed, "transfer finished");
        Ok(pages)
    }

    fn log_abort(&mut self, stage: &'static str, rc: ReturnCode) {
        let condition = self.status();
        warn!(
            stage,
            code = ?rc,
            condition = ?condition,
            "transfer aborted: {}",
            condition.description()
        );
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Disable and close the open source. No-op when no source is open.
    pub fn close_source(&mut self) -> TwainResult<()> {
        if self.state.is_source_enabled() {
            let mut ui = UserInterface {
                show_ui: false,
                modal_ui: false,
                parent: self.parent,
            };
            let rc = self.dispatch_to_source(DISABLE_DS, Payload::UserInterface(&mut ui));
            if !rc.is_success() {
                return Err(self.protocol_error("DisableSource", rc));
            }
            self.advance(SessionState::disable)?;
        }

        if self.state.is_source_open() {
            let mut identity = self.active.clone().unwrap_or_default();
            let rc = self
                .dsm
                .entry(&mut self.app, None, CLOSE_DS, Payload::Identity(&mut identity));
            debug!(triplet = %CLOSE_DS, code = ?rc, "dispatch");
            if !rc.is_success() {
                return Err(self.protocol_error("CloseSource", rc));
            }
            self.active = None;
            self.advance(SessionState::close_source)?;
            info!(source = %identity.product_name, "source closed");
        }
        Ok(())
    }

    /// Close the source, then the manager, and reset the application id.
    /// No-op for stages already closed.
    pub fn close_manager(&mut self) -> TwainResult<()> {
        self.close_source()?;
        if self.state.is_manager_open() {
            let mut parent = self.parent;
            let rc = self
                .dsm
                .entry(&mut self.app, None, CLOSE_DSM, Payload::Parent(&mut parent));
            debug!(triplet = %CLOSE_DSM, code = ?rc, "dispatch");
            if !rc.is_success() {
                return Err(self.protocol_error("CloseManager", rc));
            }
            self.advance(SessionState::close_manager)?;
            info!("data source manager closed");
        }
        self.app.id = 0;
        Ok(())
    }

    /// Best-effort source teardown after `cause` was already reported.
    fn recover_source(&mut self, cause: &TwainError) {
        if let Err(cleanup) = self.close_source() {
            warn!(error = %cleanup, cause = %cause, "closing source during recovery failed");
        }
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Condition code of the last failure, as reported by the manager.
    pub fn status(&mut self) -> ConditionCode {
        let mut status = Status::default();
        let rc = self.dsm.entry(&mut self.app, None, STATUS, Payload::Status(&mut status));
        if rc.is_success() {
            ConditionCode::from_raw(status.condition_code)
        } else {
            debug!(code = ?rc, "status query failed");
            ConditionCode::Bummer
        }
    }

    pub(crate) fn protocol_error(&mut self, operation: &'static str, code: ReturnCode) -> TwainError {
        let condition = self.status();
        warn!(operation, code = ?code, condition = ?condition, "protocol call failed");
        TwainError::Protocol {
            operation,
            code,
            condition,
            message: condition.description().to_string(),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    pub(crate) fn dispatch_to_source(&mut self, triplet: Triplet, payload: Payload<'_>) -> ReturnCode {
        let rc = self
            .dsm
            .entry(&mut self.app, self.active.as_ref(), triplet, payload);
        debug!(%triplet, code = ?rc, "dispatch");
        rc
    }

    pub(crate) fn advance(
        &mut self,
        transition: impl FnOnce(SessionState) -> TwainResult<SessionState>,
    ) -> TwainResult<()> {
        let from = self.state;
        let to = transition(from)?;
        debug!(%from, %to, "state transition");
        self.state = to;
        if let Some(observer) = self.observer.as_mut() {
            observer(from, to);
        }
        Ok(())
    }
}

impl Drop for ScannerSession {
    fn drop(&mut self) {
        if let Err(err) = self.close_manager() {
            warn!(error = %err, "closing session on drop failed");
        }
    }
}
