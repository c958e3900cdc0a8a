use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Extension, Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    bridge::BridgeHandle,
    config::Config,
    error::Error,
    gpio::{OutputPin, PinRole, Pulse, SysfsPin},
    peer,
    serial::SerialLink,
    watchdog::{LinkState, ProcessExit, Restart, SystemUptime, UdpProbe, Uptime, Watchdog},
};

/// The ports the server ended up bound to.
#[derive(Debug, Clone, Copy)]
pub struct Ports {
    /// The raw byte bridge.
    pub bridge: u16,

    /// The HTTP control endpoints.
    pub http: u16,
}

/// Everything the server needs, assembled once at startup and handed to
/// the pieces that use it. There is no process-global state.
pub struct App {
    config: Config,
    serial: SerialLink,
    reset_pin: Box<dyn OutputPin>,
    shutdown_pin: Box<dyn OutputPin>,
    restart: Arc<dyn Restart>,
    link: Arc<dyn LinkState>,
    uptime: Arc<dyn Uptime>,
}

impl App {
    /// Assemble against the real hardware described by the config.
    ///
    /// Fails if the config is invalid, the serial port cannot be opened
    /// with the required line settings, or a pin cannot be exported.
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;

        let serial = SerialLink::open(&config.serial_path)?;
        let reset_pin = Box::new(SysfsPin::export(config.reset_pin)?);
        let shutdown_pin = Box::new(SysfsPin::export(config.shutdown_pin)?);
        let link = Arc::new(UdpProbe::new(config.probe_address));

        Ok(Self::with_parts(
            config,
            serial,
            reset_pin,
            shutdown_pin,
            Arc::new(ProcessExit),
            link,
        ))
    }

    /// Assemble from explicit collaborators.
    ///
    /// This is how tests run the full server against fabricated
    /// hardware.
    pub fn with_parts(
        config: Config,
        serial: SerialLink,
        reset_pin: Box<dyn OutputPin>,
        shutdown_pin: Box<dyn OutputPin>,
        restart: Arc<dyn Restart>,
        link: Arc<dyn LinkState>,
    ) -> Self {
        Self {
            config,
            serial,
            reset_pin,
            shutdown_pin,
            restart,
            link,
            uptime: Arc::new(SystemUptime::new()),
        }
    }

    /// Run with the ports given in the config.
    pub async fn run(self) -> Result<(), Error> {
        self.serve(false, None).await
    }

    /// Run on arbitrary available ports.
    /// The ports allocated will be sent on the provided channel.
    pub async fn run_any_port(self, allocated_ports: oneshot::Sender<Ports>) -> Result<(), Error> {
        self.serve(true, Some(allocated_ports)).await
    }

    async fn serve(
        self,
        any_port: bool,
        allocated_ports: Option<oneshot::Sender<Ports>>,
    ) -> Result<(), Error> {
        let bridge_port = if any_port { 0 } else { self.config.bridge_port };
        let http_port = if any_port { 0 } else { self.config.http_port };

        let bridge_addr = SocketAddr::from(([0, 0, 0, 0], bridge_port));
        let listener = TcpListener::bind(bridge_addr)
            .await
            .map_err(|source| Error::Bind {
                addr: bridge_addr,
                source,
            })?;
        let bridge_addr = listener.local_addr().map_err(|source| Error::Bind {
            addr: bridge_addr,
            source,
        })?;

        let bridge = BridgeHandle::new(self.serial.commands());

        // The serial dispatcher: whatever the port reads goes to the
        // engine, which fans it out.
        let mut from_wire = self.serial.incoming();
        let serial_bridge = bridge.clone();
        tokio::spawn(async move {
            loop {
                match from_wire.recv().await {
                    Ok(chunk) => serial_bridge.serial_data(chunk),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Serial reader lagging, chunks lost")
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        tokio::spawn(peer::accept_loop(listener, bridge));

        let watchdog = Watchdog::new(
            self.uptime.clone(),
            self.link.clone(),
            self.restart.clone(),
        );
        tokio::spawn(watchdog.run());

        let actions = Actions {
            reset: Pulse::new(PinRole::Reset, self.reset_pin),
            shutdown: Pulse::new(PinRole::Shutdown, self.shutdown_pin),
            restart: self.restart.clone(),
        };

        // No document root on purpose; the HTTP surface is exactly these
        // control endpoints.
        let app = Router::new()
            .route("/reset", get(reset).post(reset))
            .route("/shutdown", get(shutdown).post(shutdown))
            .route("/wake-up", get(wake_up).post(wake_up))
            .route("/reset-esp32", get(reboot).post(reboot))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    // Each handler needs to reach the pins and the
                    // restart collaborator.
                    .layer(Extension(actions)),
            );

        let http_addr = SocketAddr::from(([0, 0, 0, 0], http_port));
        let server = axum::Server::bind(&http_addr).serve(app.into_make_service());
        let http_addr = server.local_addr();

        if let Some(ports_reply) = allocated_ports {
            ports_reply
                .send(Ports {
                    bridge: bridge_addr.port(),
                    http: http_addr.port(),
                })
                .expect("The receiver of which ports were allocated should not be dropped");
        }

        info!(serial = self.serial.path(), bridge = %bridge_addr, http = %http_addr, "Listening");

        server.await.expect("HTTP server should not fail");

        Ok(())
    }
}

/// What the HTTP handlers act upon.
#[derive(Clone)]
struct Actions {
    reset: Pulse,
    shutdown: Pulse,
    restart: Arc<dyn Restart>,
}

fn pulse_response(pulse: &Pulse) -> impl IntoResponse {
    pulse.trigger();

    (StatusCode::NO_CONTENT, [(header::CONNECTION, "close")])
}

async fn reset(Extension(actions): Extension<Actions>) -> impl IntoResponse {
    pulse_response(&actions.reset)
}

async fn shutdown(Extension(actions): Extension<Actions>) -> impl IntoResponse {
    pulse_response(&actions.shutdown)
}

// Waking the board is the same momentary press as shutting it down.
async fn wake_up(Extension(actions): Extension<Actions>) -> impl IntoResponse {
    pulse_response(&actions.shutdown)
}

async fn reboot(Extension(actions): Extension<Actions>) -> impl IntoResponse {
    actions.restart.restart();

    // In production the process is gone before this is observable.
    StatusCode::NO_CONTENT
}
