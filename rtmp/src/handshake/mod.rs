//! The simple RTMP handshake, server side.
//!
//! C0 carries the protocol version and must be 3 (unencrypted RTMP).  C1 and
//! S1 are 1536 byte packets: a 4 byte time, 4 zero bytes, and 1528 bytes of
//! filler.  S2 echoes C1 with the second time field set to our receive time,
//! and C2 is only length-checked.  The FMS digest variant is deliberately
//! not implemented.

mod errors;

pub use self::errors::HandshakeError;

use crate::connection::BufDuplex;
use byteorder::{BigEndian, ByteOrder};
use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};

pub const RTMP_VERSION: u8 = 3;
const PACKET_SIZE: usize = 1536;

/// Runs the full C0/C1/C2 - S0/S1/S2 exchange.  Any failure is fatal for
/// the connection; the caller bounds the exchange with a timeout.
pub async fn serve<S>(io: &mut BufDuplex<S>, epoch: u32) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let c0 = io.read_u8().await?;
    if c0 != RTMP_VERSION {
        return Err(HandshakeError::UnsupportedVersion { version: c0 });
    }

    let c1 = io.read_exact(PACKET_SIZE).await?;

    io.write(&[RTMP_VERSION]);
    io.write(&build_s1(epoch));
    io.write(&build_s2(&c1, epoch));
    io.flush().await?;

    // C2 content is not validated beyond its length
    let _c2 = io.read_exact(PACKET_SIZE).await?;

    Ok(())
}

fn build_s1(epoch: u32) -> [u8; PACKET_SIZE] {
    let mut packet = [0_u8; PACKET_SIZE];
    BigEndian::write_u32(&mut packet[0..4], epoch);
    rand::thread_rng().fill(&mut packet[8..]);
    packet
}

fn build_s2(c1: &[u8], receive_time: u32) -> [u8; PACKET_SIZE] {
    let mut packet = [0_u8; PACKET_SIZE];
    packet.copy_from_slice(c1);
    BigEndian::write_u32(&mut packet[4..8], receive_time);
    packet
}
