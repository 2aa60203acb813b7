//! Serial (RTU) and TCP transports for a server instance.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_modbus::server::rtu;
use tokio_modbus::server::tcp::{self, accept_tcp_connection};
use tracing::{debug, info, warn};

use crate::config::{ServerConfig, TransportConfig};
use crate::service::{RegisterService, SharedCore};

/// Error type for transport setup and serving.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Serial open failed: {0}")]
    Serial(#[from] tokio_serial::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid bind address: {0}")]
    InvalidBind(String),
}

/// Serial line settings resolved from the configuration.
pub fn serial_builder(
    port: &str,
    baud_rate: u32,
    data_bits: u8,
    parity: &str,
    stop_bits: u8,
) -> tokio_serial::SerialPortBuilder {
    let parity = match parity.to_lowercase().as_str() {
        "none" => tokio_serial::Parity::None,
        "even" => tokio_serial::Parity::Even,
        "odd" => tokio_serial::Parity::Odd,
        _ => tokio_serial::Parity::None,
    };

    let stop_bits = match stop_bits {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    };

    let data_bits = match data_bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    };

    tokio_serial::new(port, baud_rate)
        .parity(parity)
        .stop_bits(stop_bits)
        .data_bits(data_bits)
}

/// Serve `core` on the transport configured for `server` until an I/O error occurs.
pub async fn run(server: &ServerConfig, core: SharedCore) -> Result<(), TransportError> {
    match &server.transport {
        TransportConfig::Rtu {
            port,
            baud_rate,
            data_bits,
            parity,
            stop_bits,
        } => {
            let builder = serial_builder(port, *baud_rate, *data_bits, parity, *stop_bits);
            let serial = tokio_serial::SerialStream::open(&builder)?;

            info!(
                server = %server.name,
                port = %port,
                baud_rate,
                station = server.station_address,
                "Serving Modbus RTU"
            );

            rtu::Server::new(serial)
                .serve_forever(RegisterService::rtu(core, &server.name))
                .await?;
            Ok(())
        }
        TransportConfig::Tcp { bind } => {
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| TransportError::InvalidBind(format!("{}: {}", bind, e)))?;
            let listener = TcpListener::bind(addr).await?;

            info!(
                server = %server.name,
                bind = %addr,
                station = server.station_address,
                "Serving Modbus TCP"
            );

            serve_tcp(listener, core, &server.name).await
        }
    }
}

/// Serve Modbus TCP on an already bound listener.
///
/// Every session shares `core`, so a request from one client sees the
/// writes of the others.
pub async fn serve_tcp(
    listener: TcpListener,
    core: SharedCore,
    name: &str,
) -> Result<(), TransportError> {
    let server = tcp::Server::new(listener);
    let name = name.to_string();

    let on_connected = {
        let name = name.clone();
        move |stream, socket_addr: SocketAddr| {
            let core = core.clone();
            let name = name.clone();
            async move {
                accept_tcp_connection(stream, socket_addr, move |peer| {
                    debug!(server = %name, %peer, "Client connected");
                    Ok(Some(RegisterService::tcp(core.clone(), &name)))
                })
            }
        }
    };

    let on_process_error = move |err: std::io::Error| {
        warn!(server = %name, error = %err, "Modbus TCP session error");
    };

    server.serve(&on_connected, on_process_error).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_bind_is_rejected() {
        let server = ServerConfig {
            name: "bad".to_string(),
            station_address: 1,
            transport: TransportConfig::Tcp {
                bind: "not-an-address".to_string(),
            },
            hook_budget_ms: 5,
            holding_registers: Vec::new(),
            input_registers: Vec::new(),
        };
        let core = crate::service::shared(
            regserver_core::ModbusServerCore::builder(1)
                .build()
                .unwrap(),
        );

        let err = run(&server, core).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidBind(_)));
    }
}
