//! Module reading frames from the microcontroller attached to the serial port.
use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::codec::FramedRead;

use crate::config::{SerialMode, SerialParameters};
use crate::decode::{decode_sensor_line, RecordKind};
use crate::framer::FrameCodec;
use crate::ingest::{Ingestor, Origin};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Could not open serial device {device}: \'{source}\'")]
    Open {
        device: String,
        #[source]
        source: tokio_serial::Error,
    },
}

/// Opens the serial device. A failure is not retried.
pub fn open(params: &SerialParameters) -> Result<SerialStream, TransportError> {
    let port = tokio_serial::new(params.device.as_str(), params.baud_rate)
        .open_native_async()
        .map_err(|source| TransportError::Open { device: params.device.clone(), source })?;

    log::info!(target: "sensorlogd::serial", "Serial device open at {}@{}", params.device, params.baud_rate);
    Ok(port)
}

/// Reads frames from `reader` until the stream ends or `shutdown` fires.
///
/// Every frame is handed to the ingestor before the next one is read, so frames are
/// processed in arrival order. A bad frame or a failed insert never stops the loop.
pub async fn read_frames<R>(reader: R,
                            codec: FrameCodec,
                            mode: SerialMode,
                            ingestor: Ingestor,
                            mut shutdown: watch::Receiver<bool>)
where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, codec);

    loop {
        let frame = tokio::select! {
            frame = frames.next() => frame,
            _ = shutdown.changed() => {
                log::debug!(target: "sensorlogd::serial", "Stopping serial intake!");
                return;
            }
        };

        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                log::error!(target: "sensorlogd::serial", "Serial device cannot be read: \'{}\'", err);
                continue;
            }
            None => {
                log::warn!(target: "sensorlogd::serial", "Serial stream closed!");
                return;
            }
        };

        log::trace!(target: "sensorlogd::serial", "Received frame \'{}\'", frame);
        handle_frame(&ingestor, mode, frame).await;
    }
}

async fn handle_frame(ingestor: &Ingestor, mode: SerialMode, frame: String) {
    match mode {
        SerialMode::Raw => ingestor.forward_raw(frame),
        SerialMode::Json => {
            let sample = match decode_sensor_line(&frame) {
                Ok(sample) => sample,
                Err(err) => {
                    RecordKind::Sensor.policy().reject("sensorlogd::serial", &frame, &err);
                    return;
                }
            };
            // the ingestor logs failed inserts
            let _ = ingestor.ingest_sensor(sample, Origin::Serial).await;
        }
    }
}
