// src/protocol/translator.rs

//! Binary translation of packets.
//!
//! A frame is `[type: u8][len: u32 LE][bincode payload]`. The reader checks
//! the type byte before decoding, so a frame can only be read back as the
//! value it was written as.

use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use crate::errors::{BuildError, Result};
use crate::events::BuildEvent;
use crate::protocol::packets::{
    NodeShutdown, Packet, PacketType, TaskHostConfiguration, TaskHostTaskComplete,
};
use crate::protocol::task_host::{TaskHostBuildRequest, TaskHostBuildResponse};
use crate::registry::TaskRegistry;
use crate::request::{BuildRequest, ConfigCache};

/// A value with its own packet type.
pub trait Translatable: Serialize + DeserializeOwned {
    const PACKET_TYPE: PacketType;
}

macro_rules! translatable {
    ($($ty:ty => $packet:ident),* $(,)?) => {
        $(
            impl Translatable for $ty {
                const PACKET_TYPE: PacketType = PacketType::$packet;
            }
        )*
    };
}

translatable! {
    BuildRequest => BuildRequest,
    ConfigCache => ConfigCache,
    TaskRegistry => TaskRegistry,
    TaskHostConfiguration => TaskHostConfiguration,
    TaskHostTaskComplete => TaskHostTaskComplete,
    BuildEvent => LogMessage,
    TaskHostBuildRequest => TaskHostBuildRequest,
    TaskHostBuildResponse => TaskHostBuildResponse,
    NodeShutdown => NodeShutdown,
}

const HEADER_LEN: usize = 5;

#[derive(Debug)]
pub struct WriteTranslator<W: Write> {
    writer: W,
}

impl<W: Write> WriteTranslator<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write<T: Translatable>(&mut self, value: &T) -> Result<()> {
        let payload = bincode::serialize(value)?;
        self.write_frame(T::PACKET_TYPE, &payload)
    }

    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        match packet {
            Packet::BuildRequest(v) => self.write(v),
            Packet::ConfigCache(v) => self.write(v),
            Packet::TaskRegistry(v) => self.write(v),
            Packet::TaskHostConfiguration(v) => self.write(v.as_ref()),
            Packet::TaskHostTaskComplete(v) => self.write(v),
            Packet::LogMessage(v) => self.write(v),
            Packet::TaskHostBuildRequest(v) => self.write(v),
            Packet::TaskHostBuildResponse(v) => self.write(v),
            Packet::NodeShutdown(v) => self.write(v),
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_frame(&mut self, packet_type: PacketType, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len()).map_err(|_| {
            BuildError::Translation(format!("{packet_type} payload of {} bytes is too large", payload.len()))
        })?;
        self.writer.write_all(&[packet_type as u8])?;
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(payload)?;
        trace!(%packet_type, len, "wrote packet");
        Ok(())
    }
}

#[derive(Debug)]
pub struct ReadTranslator<R: Read> {
    reader: R,
}

impl<R: Read> ReadTranslator<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read one frame, which must hold a `T`.
    pub fn read<T: Translatable>(&mut self) -> Result<T> {
        let Some((packet_type, payload)) = self.read_frame()? else {
            return Err(BuildError::Translation(format!(
                "stream ended while expecting a {} packet",
                T::PACKET_TYPE
            )));
        };
        if packet_type != T::PACKET_TYPE {
            return Err(BuildError::Translation(format!(
                "expected a {} packet but found {packet_type}",
                T::PACKET_TYPE
            )));
        }
        Ok(bincode::deserialize(&payload)?)
    }

    /// Read the next packet of any type; `None` at a clean end of stream.
    pub fn read_packet(&mut self) -> Result<Option<Packet>> {
        let Some((packet_type, payload)) = self.read_frame()? else {
            return Ok(None);
        };
        let packet = match packet_type {
            PacketType::BuildRequest => Packet::BuildRequest(bincode::deserialize(&payload)?),
            PacketType::ConfigCache => Packet::ConfigCache(bincode::deserialize(&payload)?),
            PacketType::TaskRegistry => Packet::TaskRegistry(bincode::deserialize(&payload)?),
            PacketType::TaskHostConfiguration => {
                Packet::TaskHostConfiguration(Box::new(bincode::deserialize(&payload)?))
            }
            PacketType::TaskHostTaskComplete => {
                Packet::TaskHostTaskComplete(bincode::deserialize(&payload)?)
            }
            PacketType::LogMessage => Packet::LogMessage(bincode::deserialize(&payload)?),
            PacketType::TaskHostBuildRequest => {
                Packet::TaskHostBuildRequest(bincode::deserialize(&payload)?)
            }
            PacketType::TaskHostBuildResponse => {
                Packet::TaskHostBuildResponse(bincode::deserialize(&payload)?)
            }
            PacketType::NodeShutdown => Packet::NodeShutdown(bincode::deserialize(&payload)?),
        };
        Ok(Some(packet))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn read_frame(&mut self) -> Result<Option<(PacketType, Vec<u8>)>> {
        let mut header = [0u8; HEADER_LEN];
        let read = read_fully(&mut self.reader, &mut header)?;
        if read == 0 {
            return Ok(None);
        }
        if read < HEADER_LEN {
            return Err(BuildError::Translation(format!(
                "truncated packet header: {read} of {HEADER_LEN} bytes"
            )));
        }
        let packet_type = PacketType::try_from(header[0])
            .map_err(|b| BuildError::Translation(format!("unknown packet type {b}")))?;
        let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;

        // The length comes off the wire, so grow the buffer as bytes arrive.
        let mut payload = Vec::new();
        let read = self.reader.by_ref().take(len as u64).read_to_end(&mut payload)?;
        if read < len {
            return Err(BuildError::Translation(format!(
                "truncated {packet_type} packet: {read} of {len} payload bytes"
            )));
        }
        trace!(%packet_type, len, "read packet");
        Ok(Some((packet_type, payload)))
    }
}

/// Like `read_exact`, but reports how much was read before end of stream.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Encode a packet into a standalone frame.
pub fn packet_to_bytes(packet: &Packet) -> Result<Vec<u8>> {
    let mut translator = WriteTranslator::new(Vec::new());
    translator.write_packet(packet)?;
    Ok(translator.into_inner())
}

/// Decode a standalone frame; empty input is an error.
pub fn packet_from_bytes(bytes: &[u8]) -> Result<Packet> {
    ReadTranslator::new(bytes)
        .read_packet()?
        .ok_or_else(|| BuildError::Translation("empty packet".to_string()))
}

/// Encode one value into a standalone frame.
pub fn to_bytes<T: Translatable>(value: &T) -> Result<Vec<u8>> {
    let mut translator = WriteTranslator::new(Vec::new());
    translator.write(value)?;
    Ok(translator.into_inner())
}

pub fn from_bytes<T: Translatable>(bytes: &[u8]) -> Result<T> {
    ReadTranslator::new(bytes).read()
}
