//! `tokio-modbus` service bridging decoded frames to the register engine.
//!
//! The transport decodes frames into [`SlaveRequest`]s; this service
//! converts them into core requests, runs them against the shared
//! [`ModbusServerCore`] and converts the outcome back. Returning
//! `Ok(None)` tells the transport not to answer at all, which is how
//! requests for other stations and broadcasts are handled.

use std::future;
use std::sync::{Arc, Mutex};

use regserver_core::{
    ExceptionCode as CoreException, ModbusServerCore, Reply, Request as CoreRequest,
};
use tokio_modbus::prelude::*;
use tracing::{debug, error};

/// Unit id a Modbus TCP client sends when the unit is not significant.
pub const TCP_UNIT_NOT_SIGNIFICANT: u8 = 0xFF;

/// A TCP server is addressed by its IP address, so unit ids 0 and 0xFF
/// both reach the configured station and there is no TCP broadcast.
fn tcp_addresses_station(unit: u8) -> bool {
    unit == TCP_UNIT_NOT_SIGNIFICANT || unit == regserver_core::BROADCAST_UNIT
}

/// Server core shared between the sessions of one server.
///
/// A single lock guards both register spaces; a request holds it from
/// address resolution until the last store.
pub type SharedCore = Arc<Mutex<ModbusServerCore>>;

/// Wrap a core for sharing across sessions.
pub fn shared(core: ModbusServerCore) -> SharedCore {
    Arc::new(Mutex::new(core))
}

/// Per-session service handed to the `tokio-modbus` server.
#[derive(Clone)]
pub struct RegisterService {
    core: SharedCore,
    server: Arc<str>,
    tcp: bool,
}

impl RegisterService {
    /// Service for a serial (RTU) line.
    pub fn rtu(core: SharedCore, server: &str) -> Self {
        Self {
            core,
            server: Arc::from(server),
            tcp: false,
        }
    }

    /// Service for a TCP session. Unit ids 0 and 0xFF address this station.
    pub fn tcp(core: SharedCore, server: &str) -> Self {
        Self {
            core,
            server: Arc::from(server),
            tcp: true,
        }
    }

    /// Run one decoded request.
    pub fn dispatch(
        &self,
        unit: u8,
        request: &Request<'_>,
    ) -> Result<Option<Response>, ExceptionCode> {
        let core_request = to_core_request(request);

        let mut core = match self.core.lock() {
            Ok(core) => core,
            Err(_) => {
                error!(server = %self.server, "Register state lock poisoned");
                return Err(ExceptionCode::ServerDeviceFailure);
            }
        };

        let unit = if self.tcp && tcp_addresses_station(unit) {
            core.station()
        } else {
            unit
        };

        match core.serve(unit, &core_request) {
            None => Ok(None),
            Some(Ok(reply)) => Ok(Some(to_response(&core_request, reply))),
            Some(Err(exception)) => {
                debug!(
                    server = %self.server,
                    unit,
                    request = ?core_request,
                    %exception,
                    "Exception reply"
                );
                Err(to_exception(exception))
            }
        }
    }
}

impl tokio_modbus::server::Service for RegisterService {
    type Request = SlaveRequest<'static>;
    type Response = Option<Response>;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        future::ready(self.dispatch(req.slave, &req.request))
    }
}

/// Convert a decoded `tokio-modbus` request into a core request.
pub fn to_core_request(request: &Request<'_>) -> CoreRequest {
    match request {
        Request::ReadHoldingRegisters(address, quantity) => CoreRequest::ReadHolding {
            address: *address,
            quantity: *quantity,
        },
        Request::ReadInputRegisters(address, quantity) => CoreRequest::ReadInput {
            address: *address,
            quantity: *quantity,
        },
        Request::WriteSingleRegister(address, value) => CoreRequest::WriteHolding {
            address: *address,
            value: *value,
        },
        Request::WriteMultipleRegisters(address, values) => CoreRequest::WriteMultipleHolding {
            address: *address,
            values: values.to_vec(),
        },
        other => CoreRequest::Unsupported(other.function_code().value()),
    }
}

/// Convert a core reply into the matching `tokio-modbus` response.
pub fn to_response(request: &CoreRequest, reply: Reply) -> Response {
    match (request, reply) {
        (CoreRequest::ReadInput { .. }, Reply::Registers(values)) => {
            Response::ReadInputRegisters(values)
        }
        (_, Reply::Registers(values)) => Response::ReadHoldingRegisters(values),
        (_, Reply::WriteSingle { address, value }) => Response::WriteSingleRegister(address, value),
        (_, Reply::WriteMultiple { address, quantity }) => {
            Response::WriteMultipleRegisters(address, quantity)
        }
    }
}

/// Convert a core exception into the `tokio-modbus` exception code.
pub fn to_exception(exception: CoreException) -> ExceptionCode {
    match exception {
        CoreException::IllegalFunction => ExceptionCode::IllegalFunction,
        CoreException::IllegalDataAddress => ExceptionCode::IllegalDataAddress,
        CoreException::IllegalDataValue => ExceptionCode::IllegalDataValue,
        CoreException::ServerDeviceFailure => ExceptionCode::ServerDeviceFailure,
    }
}
