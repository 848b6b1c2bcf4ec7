//! In-process data source manager with scripted sources.
//!
//! Enforces the same call ordering a real manager does (manager open before
//! any source, source open before capabilities, enabled before transfers)
//! and reports sequencing violations as `SeqError`. Every dispatched triplet
//! is recorded and failures can be injected per triplet, so tests can drive
//! any recovery path of the session.
//!
//! Clones share state: keep one clone for inspection and hand the other to
//! the session.

use super::{CapabilityPayload, DsmEntry, HandleMemory, Payload};
use crate::error::{TwainError, TwainResult};
use crate::marshal::{Container, ContainerKind, Value, WireType};
use crate::protocol::{
    cap, ConditionCode, DataArgType, DataGroup, Identity, ImageInfo, Message, ProtocolFlavor,
    ReturnCode, Triplet, Version,
};
use byteorder::{LittleEndian, WriteBytesExt};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const FIRST_SOURCE_ID: u32 = 100;
const APP_ID: u32 = 1;
const DPI: f32 = 300.0;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Heap blocks standing in for movable global memory.
#[derive(Default)]
pub struct SimulatedMemory {
    blocks: Mutex<MemoryBlocks>,
}

#[derive(Default)]
struct MemoryBlocks {
    next: usize,
    live: HashMap<usize, Vec<u8>>,
}

impl SimulatedMemory {
    fn alloc(&self, bytes: Vec<u8>) -> usize {
        let mut blocks = lock(&self.blocks);
        blocks.next += 0x10;
        let handle = 0x1000 + blocks.next;
        blocks.live.insert(handle, bytes);
        handle
    }

    /// Number of handles not yet released.
    pub fn live(&self) -> usize {
        lock(&self.blocks).live.len()
    }
}

impl HandleMemory for SimulatedMemory {
    fn read(&self, handle: usize) -> TwainResult<Vec<u8>> {
        lock(&self.blocks)
            .live
            .get(&handle)
            .cloned()
            .ok_or_else(|| TwainError::InvalidBitmap(format!("unknown handle {:#x}", handle)))
    }

    fn release(&self, handle: usize) {
        lock(&self.blocks).live.remove(&handle);
    }
}

struct SimState {
    flavor: ProtocolFlavor,
    sources: Vec<Identity>,
    default_index: usize,
    manager_open: bool,
    cursor: usize,
    open_source: Option<u32>,
    enabled: bool,
    ready: bool,
    transferring: bool,
    pages: u16,
    pending: u16,
    page_width: i32,
    page_length: i32,
    pages_sent: u32,
    cancelled_page: Option<u32>,
    capabilities: BTreeMap<u16, Container>,
    script: Vec<Message>,
    queued: VecDeque<Message>,
    failures: HashMap<Triplet, InjectedFailure>,
    condition: ConditionCode,
    calls: Vec<Triplet>,
}

type Step = Result<ReturnCode, ConditionCode>;

#[derive(Debug, Clone, Copy)]
struct InjectedFailure {
    /// Dispatches that still succeed before the failure kicks in.
    skip: usize,
    condition: ConditionCode,
}

/// Scripted data source manager.
#[derive(Clone)]
pub struct SimulatedDsm {
    state: Arc<Mutex<SimState>>,
    memory: Arc<SimulatedMemory>,
}

impl SimulatedDsm {
    /// A manager exposing one source per name, in the given order. The first
    /// source is the default, each scan yields one page and the source
    /// signals "transfer ready" on the first processed event.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let mut source = Identity::source(FIRST_SOURCE_ID + i as u32, name);
                source.manufacturer = "Simulated".to_string();
                source.product_family = "Virtual Scanner".to_string();
                source.version = Version {
                    major: 1,
                    minor: 0,
                    info: "simulated".to_string(),
                    ..Version::default()
                };
                source
            })
            .collect();

        Self {
            state: Arc::new(Mutex::new(SimState {
                flavor: ProtocolFlavor::Extended,
                sources,
                default_index: 0,
                manager_open: false,
                cursor: 0,
                open_source: None,
                enabled: false,
                ready: false,
                transferring: false,
                pages: 1,
                pending: 0,
                page_width: 16,
                page_length: 8,
                pages_sent: 0,
                cancelled_page: None,
                capabilities: default_capabilities(),
                script: vec![Message::XferReady],
                queued: VecDeque::new(),
                failures: HashMap::new(),
                condition: ConditionCode::Success,
                calls: Vec::new(),
            })),
            memory: Arc::new(SimulatedMemory::default()),
        }
    }

    /// Make the source at `index` the default.
    pub fn with_default(self, index: usize) -> Self {
        lock(&self.state).default_index = index;
        self
    }

    /// Pages the feeder holds for each scan.
    pub fn with_pages(self, pages: u16) -> Self {
        lock(&self.state).pages = pages;
        self
    }

    /// Pixel size of every synthesized page.
    pub fn with_page_size(self, width: i32, length: i32) -> Self {
        {
            let mut state = lock(&self.state);
            state.page_width = width;
            state.page_length = length;
        }
        self
    }

    /// Have the native transfer of page `page` (counted from 0 across
    /// scans) hand out its bitmap but report `Cancel` instead of `XferDone`.
    pub fn with_cancelled_page(self, page: u32) -> Self {
        lock(&self.state).cancelled_page = Some(page);
        self
    }

    /// Protocol flavor reported to the session.
    pub fn with_flavor(self, flavor: ProtocolFlavor) -> Self {
        lock(&self.state).flavor = flavor;
        self
    }

    /// Sub-messages the source reports, one per processed event, after each
    /// enable.
    pub fn with_events(self, events: impl IntoIterator<Item = Message>) -> Self {
        lock(&self.state).script = events.into_iter().collect();
        self
    }

    /// Make every dispatch of `triplet` fail with `condition`.
    pub fn fail_on(&self, triplet: Triplet, condition: ConditionCode) {
        self.fail_after(triplet, 0, condition);
    }

    /// Let `successes` dispatches of `triplet` through, then fail every
    /// later one with `condition`.
    pub fn fail_after(&self, triplet: Triplet, successes: usize, condition: ConditionCode) {
        lock(&self.state).failures.insert(
            triplet,
            InjectedFailure {
                skip: successes,
                condition,
            },
        );
    }

    /// Drop every injected failure.
    pub fn clear_failures(&self) {
        lock(&self.state).failures.clear();
    }

    /// Every triplet dispatched so far, in order.
    pub fn calls(&self) -> Vec<Triplet> {
        lock(&self.state).calls.clone()
    }

    /// How often `triplet` was dispatched.
    pub fn call_count(&self, triplet: Triplet) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|t| **t == triplet)
            .count()
    }

    /// Whether the manager is open.
    pub fn is_manager_open(&self) -> bool {
        lock(&self.state).manager_open
    }

    /// Id of the open source.
    pub fn open_source(&self) -> Option<u32> {
        lock(&self.state).open_source
    }

    /// Whether the open source is enabled.
    pub fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    /// Current value of a capability as stored by the source.
    pub fn capability(&self, cap: u16) -> Option<Container> {
        lock(&self.state).capabilities.get(&cap).cloned()
    }

    /// Native bitmap handles handed out and not yet released.
    pub fn live_handles(&self) -> usize {
        self.memory.live()
    }
}

impl DsmEntry for SimulatedDsm {
    fn flavor(&self) -> ProtocolFlavor {
        lock(&self.state).flavor
    }

    fn entry(
        &mut self,
        origin: &mut Identity,
        dest: Option<&Identity>,
        triplet: Triplet,
        payload: Payload<'_>,
    ) -> ReturnCode {
        let mut state = lock(&self.state);
        state.calls.push(triplet);

        let injected = match state.failures.get_mut(&triplet) {
            Some(failure) if failure.skip > 0 => {
                failure.skip -= 1;
                None
            }
            Some(failure) => Some(failure.condition),
            None => None,
        };
        if let Some(condition) = injected {
            debug!(%triplet, ?condition, "simulated failure");
            state.condition = condition;
            return ReturnCode::Failure;
        }

        match state.dispatch(&self.memory, origin, dest, triplet, payload) {
            Ok(code) => code,
            Err(condition) => {
                debug!(%triplet, ?condition, "simulated manager rejected call");
                state.condition = condition;
                ReturnCode::Failure
            }
        }
    }

    fn memory(&self) -> Arc<dyn HandleMemory> {
        self.memory.clone()
    }
}

impl SimState {
    fn dispatch(
        &mut self,
        memory: &SimulatedMemory,
        origin: &mut Identity,
        dest: Option<&Identity>,
        triplet: Triplet,
        payload: Payload<'_>,
    ) -> Step {
        use DataArgType as Dat;

        match (triplet.group, triplet.dat, triplet.msg, payload) {
            (DataGroup::Control, Dat::Status, Message::Get, Payload::Status(status)) => {
                status.condition_code = self.condition.raw();
                self.condition = ConditionCode::Success;
                Ok(ReturnCode::Success)
            }
            (DataGroup::Control, Dat::Parent, Message::OpenDsm, Payload::Parent(_)) => {
                if self.manager_open {
                    return Err(ConditionCode::SeqError);
                }
                self.manager_open = true;
                origin.id = APP_ID;
                debug!("simulated manager opened");
                Ok(ReturnCode::Success)
            }
            (DataGroup::Control, Dat::Parent, Message::CloseDsm, Payload::Parent(_)) => {
                if !self.manager_open || self.open_source.is_some() {
                    return Err(ConditionCode::SeqError);
                }
                self.manager_open = false;
                debug!("simulated manager closed");
                Ok(ReturnCode::Success)
            }
            (DataGroup::Control, Dat::Identity, msg, Payload::Identity(identity)) => {
                self.require_manager()?;
                self.identity(msg, identity)
            }
            (DataGroup::Control, Dat::Capability, msg, Payload::Capability(record)) => {
                self.require_source(dest)?;
                self.capability(msg, record)
            }
            (DataGroup::Control, Dat::UserInterface, msg, Payload::UserInterface(_)) => {
                self.require_source(dest)?;
                self.user_interface(msg)
            }
            (DataGroup::Control, Dat::Event, Message::ProcessEvent, Payload::Event(event)) => {
                self.require_source(dest)?;
                if !self.enabled {
                    return Ok(ReturnCode::NotDsEvent);
                }
                match self.queued.pop_front() {
                    Some(outcome) => {
                        if outcome == Message::XferReady {
                            self.ready = true;
                        }
                        event.outcome = outcome;
                        Ok(ReturnCode::DsEvent)
                    }
                    None => Ok(ReturnCode::NotDsEvent),
                }
            }
            (DataGroup::Image, Dat::ImageInfo, Message::Get, Payload::ImageInfo(info)) => {
                self.require_source(dest)?;
                if !self.ready || self.transferring || self.pending == 0 {
                    return Err(ConditionCode::SeqError);
                }
                *info = self.page_info();
                Ok(ReturnCode::Success)
            }
            (DataGroup::Image, Dat::ImageNativeXfer, Message::Get, Payload::NativeXfer(handle)) => {
                self.require_source(dest)?;
                if !self.ready || self.transferring || self.pending == 0 {
                    return Err(ConditionCode::SeqError);
                }
                let page = self.pages_sent;
                *handle = memory.alloc(synthesize_dib(self.page_width, self.page_length, page));
                self.pages_sent += 1;
                self.transferring = true;
                if self.cancelled_page == Some(page) {
                    return Ok(ReturnCode::Cancel);
                }
                Ok(ReturnCode::XferDone)
            }
            (DataGroup::Control, Dat::PendingXfers, msg, Payload::PendingXfers(pending)) => {
                self.require_source(dest)?;
                match msg {
                    Message::EndXfer if self.transferring => {
                        self.transferring = false;
                        self.pending = self.pending.saturating_sub(1);
                        if self.pending == 0 {
                            self.ready = false;
                        }
                        pending.count = self.pending;
                        Ok(ReturnCode::Success)
                    }
                    Message::Reset if self.enabled => {
                        self.transferring = false;
                        self.pending = 0;
                        self.ready = false;
                        pending.count = 0;
                        Ok(ReturnCode::Success)
                    }
                    Message::EndXfer | Message::Reset => Err(ConditionCode::SeqError),
                    _ => Err(ConditionCode::BadProtocol),
                }
            }
            _ => Err(ConditionCode::BadProtocol),
        }
    }

    fn require_manager(&self) -> Result<(), ConditionCode> {
        if self.manager_open {
            Ok(())
        } else {
            Err(ConditionCode::SeqError)
        }
    }

    fn require_source(&self, dest: Option<&Identity>) -> Result<(), ConditionCode> {
        self.require_manager()?;
        match (self.open_source, dest) {
            (Some(open), Some(dest)) if open == dest.id => Ok(()),
            (None, _) => Err(ConditionCode::SeqError),
            _ => Err(ConditionCode::BadDest),
        }
    }

    fn identity(&mut self, msg: Message, identity: &mut Identity) -> Step {
        match msg {
            Message::GetFirst => {
                self.cursor = 0;
                self.next_source(identity)
            }
            Message::GetNext => self.next_source(identity),
            Message::GetDefault => {
                let source = self
                    .sources
                    .get(self.default_index)
                    .ok_or(ConditionCode::NoDs)?;
                *identity = source.clone();
                Ok(ReturnCode::Success)
            }
            Message::Set => {
                let index = self
                    .sources
                    .iter()
                    .position(|s| s.id == identity.id)
                    .ok_or(ConditionCode::NoDs)?;
                self.default_index = index;
                Ok(ReturnCode::Success)
            }
            Message::OpenDs => {
                if self.open_source.is_some() {
                    return Err(ConditionCode::SeqError);
                }
                let source = self
                    .sources
                    .iter()
                    .find(|s| s.id == identity.id)
                    .ok_or(ConditionCode::NoDs)?;
                *identity = source.clone();
                self.open_source = Some(source.id);
                self.capabilities = default_capabilities();
                debug!(source = %source.product_name, "simulated source opened");
                Ok(ReturnCode::Success)
            }
            Message::CloseDs => {
                if self.open_source != Some(identity.id) || self.enabled {
                    return Err(ConditionCode::SeqError);
                }
                self.open_source = None;
                Ok(ReturnCode::Success)
            }
            _ => Err(ConditionCode::BadProtocol),
        }
    }

    fn next_source(&mut self, identity: &mut Identity) -> Step {
        match self.sources.get(self.cursor) {
            Some(source) => {
                *identity = source.clone();
                self.cursor += 1;
                Ok(ReturnCode::Success)
            }
            None => Ok(ReturnCode::EndOfList),
        }
    }

    fn capability(&mut self, msg: Message, record: &mut CapabilityPayload) -> Step {
        let stored = self
            .capabilities
            .get(&record.cap)
            .cloned()
            .ok_or(ConditionCode::CapUnsupported)?;

        let reply = match msg {
            Message::Get => stored,
            Message::GetCurrent | Message::GetDefault => {
                let value = match (&stored, msg) {
                    (Container::Range { default, .. }, Message::GetDefault) => default.clone(),
                    (
                        Container::Enumeration {
                            default_index,
                            items,
                            ..
                        },
                        Message::GetDefault,
                    ) => items
                        .get(*default_index as usize)
                        .cloned()
                        .ok_or(ConditionCode::BadValue)?,
                    _ => stored.current().cloned().ok_or(ConditionCode::BadValue)?,
                };
                Container::one(stored.item_type(), value)
            }
            Message::Set => {
                if self.enabled {
                    return Err(ConditionCode::SeqError);
                }
                let kind =
                    ContainerKind::from_code(record.kind).map_err(|_| ConditionCode::BadValue)?;
                let incoming =
                    Container::decode(kind, &record.data).map_err(|_| ConditionCode::BadValue)?;
                let updated = apply_set(record.cap, &stored, incoming)?;
                self.capabilities.insert(record.cap, updated);
                return Ok(ReturnCode::Success);
            }
            _ => return Err(ConditionCode::CapBadOperation),
        };

        record.kind = reply.kind().code();
        record.data = reply.encode().map_err(|_| ConditionCode::LowMemory)?;
        Ok(ReturnCode::Success)
    }

    fn user_interface(&mut self, msg: Message) -> Step {
        match msg {
            Message::EnableDs => {
                if self.enabled {
                    return Err(ConditionCode::SeqError);
                }
                self.enabled = true;
                let limit = self
                    .capabilities
                    .get(&cap::XFER_COUNT)
                    .and_then(|c| c.current())
                    .and_then(Value::as_i64)
                    .unwrap_or(-1);
                self.pending = if limit < 0 {
                    self.pages
                } else {
                    self.pages.min(u16::try_from(limit).unwrap_or(u16::MAX))
                };
                self.queued = self.script.iter().copied().collect();
                Ok(ReturnCode::Success)
            }
            Message::DisableDs => {
                if !self.enabled || self.transferring {
                    return Err(ConditionCode::SeqError);
                }
                self.enabled = false;
                self.ready = false;
                self.queued.clear();
                Ok(ReturnCode::Success)
            }
            _ => Err(ConditionCode::BadProtocol),
        }
    }

    fn page_info(&self) -> ImageInfo {
        ImageInfo {
            x_resolution: DPI,
            y_resolution: DPI,
            width: self.page_width,
            length: self.page_length,
            samples_per_pixel: 3,
            bits_per_sample: [8, 8, 8, 0, 0, 0, 0, 0],
            bits_per_pixel: 24,
            planar: false,
            pixel_type: 2,
            compression: 0,
        }
    }
}

fn apply_set(cap_id: u16, stored: &Container, incoming: Container) -> Result<Container, ConditionCode> {
    if cap_id == cap::SUPPORTED_CAPS {
        return Err(ConditionCode::CapBadOperation);
    }
    let Container::One { value, .. } = incoming else {
        return Err(ConditionCode::BadValue);
    };

    let mut updated = stored.clone();
    match &mut updated {
        Container::One { value: current, .. } => *current = value,
        Container::Range { current, .. } => *current = value,
        Container::Enumeration {
            items,
            current_index,
            ..
        } => {
            let index = items
                .iter()
                .position(|item| *item == value)
                .ok_or(ConditionCode::BadValue)?;
            *current_index = index as u32;
        }
        Container::Array { .. } => return Err(ConditionCode::CapBadOperation),
    }
    Ok(updated)
}

fn default_capabilities() -> BTreeMap<u16, Container> {
    let resolution = || Container::Range {
        item_type: WireType::Fix32,
        min: Value::Real(75.0),
        max: Value::Real(1200.0),
        step: Value::Real(1.0),
        default: Value::Real(DPI),
        current: Value::Real(DPI),
    };

    let mut caps = BTreeMap::new();
    caps.insert(
        cap::XFER_COUNT,
        Container::one(WireType::Int16, Value::Int16(-1)),
    );
    caps.insert(
        cap::PIXEL_TYPE,
        Container::Enumeration {
            item_type: WireType::UInt16,
            current_index: 2,
            default_index: 2,
            items: vec![Value::UInt16(0), Value::UInt16(1), Value::UInt16(2)],
        },
    );
    caps.insert(cap::X_RESOLUTION, resolution());
    caps.insert(cap::Y_RESOLUTION, resolution());
    caps.insert(
        cap::AUTHOR,
        Container::one(WireType::Str128, Value::Str(String::new())),
    );
    caps.insert(
        cap::DEVICE_ONLINE,
        Container::one(WireType::Bool, Value::Bool(true)),
    );

    let mut supported: Vec<Value> = caps.keys().map(|id| Value::UInt16(*id)).collect();
    supported.push(Value::UInt16(cap::SUPPORTED_CAPS));
    caps.insert(
        cap::SUPPORTED_CAPS,
        Container::Array {
            item_type: WireType::UInt16,
            items: supported,
        },
    );
    caps
}

/// Bottom-up 24-bit DIB with a gradient, distinct per page.
fn synthesize_dib(width: i32, length: i32, page: u32) -> Vec<u8> {
    let width = width.max(1);
    let length = length.max(1);
    let stride = (((width * 24 + 31) & !31) >> 3) as usize;
    let image_size = stride * length as usize;

    let mut dib = Vec::with_capacity(40 + image_size);
    // Writes into a Vec cannot fail.
    let _ = write_info_header(&mut dib, width, length, image_size as u32);

    for y in 0..length {
        let mut row = vec![0u8; stride];
        for x in 0..width {
            let offset = x as usize * 3;
            row[offset] = (x * 255 / width) as u8;
            row[offset + 1] = (y * 255 / length) as u8;
            row[offset + 2] = (page.wrapping_mul(40) % 256) as u8;
        }
        dib.extend_from_slice(&row);
    }
    dib
}

fn write_info_header(out: &mut Vec<u8>, width: i32, length: i32, image_size: u32) -> std::io::Result<()> {
    let pixels_per_meter = (DPI / 0.0254).round() as i32;
    out.write_u32::<LittleEndian>(40)?;
    out.write_i32::<LittleEndian>(width)?;
    out.write_i32::<LittleEndian>(length)?;
    out.write_u16::<LittleEndian>(1)?;
    out.write_u16::<LittleEndian>(24)?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_u32::<LittleEndian>(image_size)?;
    out.write_i32::<LittleEndian>(pixels_per_meter)?;
    out.write_i32::<LittleEndian>(pixels_per_meter)?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_u32::<LittleEndian>(0)
}
