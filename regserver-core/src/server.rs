//! Request dispatch against the holding and input register spaces.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AddressError, ConfigError, Result};
use crate::hooks::{Hook, HookRunner};
use crate::range::RegisterRange;
use crate::request::{ExceptionCode, MAX_READ_QUANTITY, MAX_WRITE_QUANTITY, Reply, Request};
use crate::space::{AccessError, RangeSnapshot, RegisterKind, RegisterSpace};

/// Unit id used for broadcast requests.
pub const BROADCAST_UNIT: u8 = 0;

/// How a request addressed to `unit` is handled by this station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Addressed to this station: process and reply.
    Unicast,
    /// Broadcast: process writes, never reply.
    Broadcast,
    /// Addressed to another station: drop silently.
    Ignore,
}

/// Declarative description of one register range.
#[derive(Clone, Default)]
pub struct RangeSpec {
    pub start_address: u16,
    pub default: u16,
    pub number: u16,
    pub on_read: Option<Hook>,
    pub on_write: Option<Hook>,
}

impl RangeSpec {
    /// A range of `number` registers at `start_address`, initialised to 0.
    pub fn new(start_address: u16, number: u16) -> Self {
        Self {
            start_address,
            number,
            ..Default::default()
        }
    }

    pub fn with_default(mut self, default: u16) -> Self {
        self.default = default;
        self
    }

    pub fn on_read(mut self, hook: Hook) -> Self {
        self.on_read = Some(hook);
        self
    }

    pub fn on_write(mut self, hook: Hook) -> Self {
        self.on_write = Some(hook);
        self
    }

    fn into_range(self) -> Result<RegisterRange> {
        let mut range = RegisterRange::new(self.start_address, self.number, self.default)?;
        if let Some(hook) = self.on_read {
            range = range.with_read_hook(hook);
        }
        if let Some(hook) = self.on_write {
            range = range.with_write_hook(hook);
        }
        Ok(range)
    }
}

/// Builder for [`ModbusServerCore`].
///
/// # Example
///
/// ```
/// use regserver_core::{ModbusServerCore, RangeSpec, Reply, Request, hook};
///
/// let mut core = ModbusServerCore::builder(1)
///     .holding(RangeSpec::new(0, 10).on_write(hook(|_, v| v.min(100))))
///     .input(RangeSpec::new(100, 2).with_default(7))
///     .build()
///     .unwrap();
///
/// core.handle(&Request::WriteHolding { address: 3, value: 500 }).unwrap();
/// let reply = core.handle(&Request::ReadHolding { address: 3, quantity: 1 });
/// assert_eq!(reply, Ok(Reply::Registers(vec![100])));
/// ```
pub struct ServerCoreBuilder {
    station: u16,
    holding: Vec<RangeSpec>,
    input: Vec<RangeSpec>,
    hook_budget: Duration,
}

impl ServerCoreBuilder {
    pub fn new(station: u16) -> Self {
        Self {
            station,
            holding: Vec::new(),
            input: Vec::new(),
            hook_budget: HookRunner::default().budget(),
        }
    }

    /// Add a holding register range.
    pub fn holding(mut self, spec: RangeSpec) -> Self {
        self.holding.push(spec);
        self
    }

    /// Add an input register range.
    pub fn input(mut self, spec: RangeSpec) -> Self {
        self.input.push(spec);
        self
    }

    /// Time a hook may take before it is reported as slow.
    pub fn hook_budget(mut self, budget: Duration) -> Self {
        self.hook_budget = budget;
        self
    }

    /// Validate the layout and build the core.
    pub fn build(self) -> Result<ModbusServerCore> {
        let station = match u8::try_from(self.station) {
            Ok(s @ 1..=247) => s,
            _ => return Err(ConfigError::InvalidStation(self.station)),
        };

        let mut holding = RegisterSpace::new(RegisterKind::Holding);
        for spec in self.holding {
            holding.register_range(spec.into_range()?)?;
        }

        let mut input = RegisterSpace::new(RegisterKind::Input);
        for spec in self.input {
            input.register_range(spec.into_range()?)?;
        }

        Ok(ModbusServerCore {
            station,
            holding,
            input,
            hooks: HookRunner::new(self.hook_budget),
        })
    }
}

/// Serializable register map of a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub station_address: u8,
    pub holding_registers: Vec<RangeSnapshot>,
    pub input_registers: Vec<RangeSnapshot>,
}

/// Serves decoded register requests.
///
/// Holds no per-request state: everything that survives a request lives in
/// the two register spaces.
#[derive(Debug)]
pub struct ModbusServerCore {
    station: u8,
    holding: RegisterSpace,
    input: RegisterSpace,
    hooks: HookRunner,
}

impl ModbusServerCore {
    pub fn builder(station: u16) -> ServerCoreBuilder {
        ServerCoreBuilder::new(station)
    }

    pub fn station(&self) -> u8 {
        self.station
    }

    pub fn space(&self, kind: RegisterKind) -> &RegisterSpace {
        match kind {
            RegisterKind::Holding => &self.holding,
            RegisterKind::Input => &self.input,
        }
    }

    /// Classify a request by its unit id.
    pub fn delivery(&self, unit: u8) -> Delivery {
        if unit == self.station {
            Delivery::Unicast
        } else if unit == BROADCAST_UNIT {
            Delivery::Broadcast
        } else {
            Delivery::Ignore
        }
    }

    /// Serve a request received for `unit`.
    ///
    /// Returns `None` when no reply must be sent: the request belongs to
    /// another station, or it was a broadcast.
    pub fn serve(
        &mut self,
        unit: u8,
        request: &Request,
    ) -> Option<std::result::Result<Reply, ExceptionCode>> {
        match self.delivery(unit) {
            Delivery::Unicast => Some(self.handle(request)),
            Delivery::Broadcast => {
                if request.is_write() {
                    if let Err(exception) = self.handle(request) {
                        tracing::debug!(%exception, ?request, "Broadcast write rejected");
                    }
                }
                None
            }
            Delivery::Ignore => {
                tracing::trace!(unit, station = self.station, "Request for another station");
                None
            }
        }
    }

    /// Serve a request addressed to this station.
    pub fn handle(&mut self, request: &Request) -> std::result::Result<Reply, ExceptionCode> {
        let result = match request {
            Request::ReadHolding { address, quantity } => {
                self.read(RegisterKind::Holding, *address, *quantity)
            }
            Request::ReadInput { address, quantity } => {
                self.read(RegisterKind::Input, *address, *quantity)
            }
            Request::WriteHolding { address, value } => self
                .write(*address, std::slice::from_ref(value))
                .map(|()| Reply::WriteSingle {
                    address: *address,
                    value: *value,
                }),
            Request::WriteMultipleHolding { address, values } => {
                self.write(*address, values).map(|()| Reply::WriteMultiple {
                    address: *address,
                    quantity: values.len() as u16,
                })
            }
            Request::Unsupported(_) => Err(ExceptionCode::IllegalFunction),
        };

        if let Err(exception) = &result {
            tracing::debug!(
                station = self.station,
                function = request.function_code().value(),
                %exception,
                "Request answered with exception"
            );
        }
        result
    }

    fn read(
        &self,
        kind: RegisterKind,
        address: u16,
        quantity: u16,
    ) -> std::result::Result<Reply, ExceptionCode> {
        if quantity == 0 || quantity > MAX_READ_QUANTITY {
            return Err(ExceptionCode::IllegalDataValue);
        }
        self.space(kind)
            .read_span(address, quantity, &self.hooks)
            .map(Reply::Registers)
            .map_err(access_exception)
    }

    fn write(&mut self, address: u16, values: &[u16]) -> std::result::Result<(), ExceptionCode> {
        if values.is_empty() || values.len() > MAX_WRITE_QUANTITY as usize {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let hooks = self.hooks;
        self.holding
            .write_span(address, values, &hooks)
            .map_err(access_exception)
    }

    /// Store values from local application code.
    ///
    /// This is how firmware logic feeds input registers that the bus can
    /// only read, so an input range's write hook runs here. Holding values
    /// are stored raw: their write hook only filters bus writes.
    pub fn store(
        &mut self,
        kind: RegisterKind,
        address: u16,
        values: &[u16],
    ) -> std::result::Result<(), AccessError> {
        match kind {
            RegisterKind::Input => {
                let hooks = self.hooks;
                self.input.write_span(address, values, &hooks)
            }
            RegisterKind::Holding => self.holding.store(address, values).map_err(AccessError::from),
        }
    }

    /// Raw stored value, bypassing read hooks.
    pub fn peek(&self, kind: RegisterKind, address: u16) -> std::result::Result<u16, AddressError> {
        self.space(kind).peek(address)
    }

    /// Current register map with stored values.
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            station_address: self.station,
            holding_registers: self.holding.snapshot(),
            input_registers: self.input.snapshot(),
        }
    }
}

fn access_exception(err: AccessError) -> ExceptionCode {
    match err {
        AccessError::Address(e) => e.into(),
        AccessError::Hook(e) => e.into(),
    }
}
