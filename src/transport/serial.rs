//! Serial transport: USB/UART link to locally attached radio hardware.
//!
//! The attached node acts as gateway: frames addressed to remote targets are
//! handed to it over the serial link and forwarded across the mesh. Reads run
//! on a dedicated blocking thread (the `serialport` crate is synchronous)
//! with a short timeout so the stop flag is observed promptly; writes are
//! short enough to perform inline under a mutex.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use prost::Message;
use serialport::SerialPort;
use tokio::sync::Mutex;

use crate::wire::framer::{encode_frame, FrameDecoder};
use crate::wire::{format_node_id, AdminRequest, MeshEnvelope};

use super::correlator::ResponseCorrelator;
use super::session::SessionTokenCache;
use super::{
    build_envelope, dispatch_inbound, new_command_id, Publisher, Reply, TransportError,
    TransportKind,
};

/// USB vendor/product ids of serial bridges commonly found on mesh radio
/// boards, used to rank discovered ports in status output.
const KNOWN_RADIO_BRIDGES: &[(u16, u16, &str)] = &[
    (0x10C4, 0xEA60, "CP210x USB-UART"),
    (0x1A86, 0x7523, "CH340/CH341"),
    (0x1A86, 0x55D4, "CH9102"),
    (0x0403, 0x6001, "FTDI FT232R"),
    (0x303A, 0x1001, "ESP32-S2/S3 native USB"),
    (0x239A, 0x8029, "nRF52840"),
];

/// One discovered serial port, for `status` output.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DiscoveredPort {
    pub device: String,
    pub description: Option<String>,
    pub likely_radio: bool,
}

/// Enumerate serial ports, radio-likely devices first.
pub fn discover_ports() -> Vec<DiscoveredPort> {
    let mut out = Vec::new();
    let ports = match serialport::available_ports() {
        Ok(p) => p,
        Err(e) => {
            warn!("serial port enumeration failed: {}", e);
            return out;
        }
    };
    for port in ports {
        let (description, likely) = match &port.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                let known = KNOWN_RADIO_BRIDGES
                    .iter()
                    .find(|(vid, pid, _)| *vid == usb.vid && *pid == usb.pid)
                    .map(|(_, _, name)| *name);
                (
                    known
                        .map(|n| n.to_string())
                        .or_else(|| usb.product.clone()),
                    known.is_some(),
                )
            }
            _ => (None, false),
        };
        out.push(DiscoveredPort {
            device: port.port_name,
            description,
            likely_radio: likely,
        });
    }
    out.sort_by_key(|p| (!p.likely_radio, p.device.clone()));
    out
}

struct SerialShared {
    correlator: ResponseCorrelator,
    sessions: SessionTokenCache,
    connected: AtomicBool,
    reader_stop: AtomicBool,
}

pub struct SerialPublisher {
    device_path: String,
    baud_rate: u32,
    local_node: u32,
    shared: Arc<SerialShared>,
    connect_guard: Mutex<()>,
    writer: StdMutex<Option<Box<dyn SerialPort>>>,
    reader_thread: StdMutex<Option<std::thread::JoinHandle<()>>>,
}

impl SerialPublisher {
    pub fn new(device_path: impl Into<String>, baud_rate: u32, local_node: u32) -> Self {
        SerialPublisher {
            device_path: device_path.into(),
            baud_rate,
            local_node,
            shared: Arc::new(SerialShared {
                correlator: ResponseCorrelator::new(),
                sessions: SessionTokenCache::new(),
                connected: AtomicBool::new(false),
                reader_stop: AtomicBool::new(false),
            }),
            connect_guard: Mutex::new(()),
            writer: StdMutex::new(None),
            reader_thread: StdMutex::new(None),
        }
    }

    fn open_port(&self) -> Result<Box<dyn SerialPort>, TransportError> {
        let mut builder = serialport::new(&self.device_path, self.baud_rate)
            .timeout(Duration::from_millis(500));
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None);
        }
        let mut port = builder.open().map_err(|e| {
            TransportError::ConnectFailed(format!(
                "failed to open serial port {}: {}",
                self.device_path, e
            ))
        })?;
        // Toggle DTR/RTS so ESP32-class boards wake from deep sleep.
        let _ = port.write_data_terminal_ready(true);
        let _ = port.write_request_to_send(true);
        std::thread::sleep(Duration::from_millis(150));
        // Drain any buffered boot chatter before framing starts.
        let mut purge = [0u8; 512];
        if let Ok(available) = port.bytes_to_read() {
            if available > 0 {
                let _ = port.read(&mut purge);
            }
        }
        Ok(port)
    }

    fn cleanup(&self) {
        self.shared.reader_stop.store(true, Ordering::SeqCst);
        *self.writer.lock().unwrap() = None;
        if let Some(handle) = self.reader_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.shared.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Publisher for SerialPublisher {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn descriptor(&self) -> String {
        format!("{}@{}", self.device_path, self.baud_rate)
    }

    async fn connect(&self) -> bool {
        let _guard = self.connect_guard.lock().await;
        if self.is_connected() {
            return true;
        }
        if !std::path::Path::new(&self.device_path).exists() {
            error!("serial port {} does not exist", self.device_path);
            return false;
        }

        let port = match self.open_port() {
            Ok(p) => p,
            Err(e) => {
                error!("{}", e);
                return false;
            }
        };
        let mut reader = match port.try_clone() {
            Ok(r) => r,
            Err(e) => {
                error!("failed to clone serial handle for reader: {}", e);
                return false;
            }
        };
        *self.writer.lock().unwrap() = Some(port);
        self.shared.reader_stop.store(false, Ordering::SeqCst);

        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || {
                let mut decoder = FrameDecoder::new();
                let mut buf = [0u8; 1024];
                while !shared.reader_stop.load(Ordering::SeqCst) {
                    match reader.read(&mut buf) {
                        Ok(0) => continue,
                        Ok(n) => {
                            decoder.push(&buf[..n]);
                            while let Some(frame) = decoder.next_frame() {
                                match MeshEnvelope::decode(&frame[..]) {
                                    Ok(env) => {
                                        if let Some(crate::wire::mesh_envelope::Body::Plain(
                                            payload,
                                        )) = &env.body
                                        {
                                            dispatch_inbound(
                                                &shared.correlator,
                                                &shared.sessions,
                                                env.from,
                                                payload,
                                            );
                                        }
                                    }
                                    Err(e) => debug!("undecodable serial frame: {}", e),
                                }
                            }
                        }
                        Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                        Err(e) => {
                            warn!("serial read error, stopping reader: {}", e);
                            break;
                        }
                    }
                }
                shared.connected.store(false, Ordering::SeqCst);
            });

        match handle {
            Ok(h) => {
                *self.reader_thread.lock().unwrap() = Some(h);
            }
            Err(e) => {
                error!("failed to spawn serial reader thread: {}", e);
                *self.writer.lock().unwrap() = None;
                return false;
            }
        }

        self.shared.connected.store(true, Ordering::SeqCst);
        info!(
            "connected to radio via {} as local node {}",
            self.device_path,
            format_node_id(self.local_node)
        );
        true
    }

    async fn disconnect(&self) {
        let _guard = self.connect_guard.lock().await;
        self.cleanup();
        info!("disconnected from serial port {}", self.device_path);
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn local_node_id(&self) -> Option<u32> {
        Some(self.local_node)
    }

    async fn send(&self, target: u32, mut request: AdminRequest, want_response: bool) -> Option<u32> {
        if !self.is_connected() {
            warn!("cannot send {}: serial not connected", request.op_name());
            return None;
        }
        request.session_token = self.shared.sessions.token_for(target);

        let command_id = new_command_id();
        let envelope = build_envelope(
            self.local_node,
            target,
            command_id,
            0,
            &request,
            want_response,
        );
        if want_response {
            self.shared.correlator.register(command_id);
        }

        let bytes = encode_frame(&envelope.encode_to_vec());
        let write_ok = {
            let mut writer = self.writer.lock().unwrap();
            match writer.as_mut() {
                Some(port) => {
                    use std::io::Write;
                    port.write_all(&bytes).and_then(|_| port.flush()).is_ok()
                }
                None => false,
            }
        };
        if !write_ok {
            warn!("serial write failed for {}", request.op_name());
            self.shared.correlator.unregister(command_id);
            self.shared.connected.store(false, Ordering::SeqCst);
            return None;
        }
        debug!(
            "sent {} to {} command_id={:08x} via serial",
            request.op_name(),
            format_node_id(target),
            command_id
        );
        Some(command_id)
    }

    async fn await_response(&self, command_id: u32, timeout: Duration) -> Option<Reply> {
        self.shared.correlator.await_response(command_id, timeout).await
    }
}

impl Drop for SerialPublisher {
    fn drop(&mut self) {
        self.shared.reader_stop.store(true, Ordering::SeqCst);
    }
}
