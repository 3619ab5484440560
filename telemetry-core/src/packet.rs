// Packet metadata read from a decrypted payload ahead of a full decode.
// Invariants: fields whose presence varies between packet variants stay optional.

use crate::constants::{CAR_ID_OFFSET, MIN_PACKET_SIZE};
use crate::parser::{read_i32, read_u32};

pub const PACKAGE_ID_OFFSET: usize = 0x70;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PacketMeta {
    pub package_id: u32,
    pub car_id: Option<i32>,
}

pub fn parse_packet_meta(payload: &[u8]) -> Option<PacketMeta> {
    if payload.len() < MIN_PACKET_SIZE {
        return None;
    }
    Some(PacketMeta {
        package_id: read_u32(payload, PACKAGE_ID_OFFSET)?,
        car_id: read_i32(payload, CAR_ID_OFFSET),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FULL_PACKET_SIZE;

    #[test]
    fn car_id_only_present_on_long_packets() {
        let mut payload = vec![0u8; FULL_PACKET_SIZE];
        payload[PACKAGE_ID_OFFSET..PACKAGE_ID_OFFSET + 4].copy_from_slice(&77u32.to_le_bytes());
        payload[CAR_ID_OFFSET..CAR_ID_OFFSET + 4].copy_from_slice(&3_312i32.to_le_bytes());

        let meta = parse_packet_meta(&payload).expect("meta");
        assert_eq!(meta.package_id, 77);
        assert_eq!(meta.car_id, Some(3_312));

        let short = parse_packet_meta(&payload[..CAR_ID_OFFSET]).expect("meta");
        assert_eq!(short.package_id, 77);
        assert_eq!(short.car_id, None);

        assert!(parse_packet_meta(&payload[..MIN_PACKET_SIZE - 1]).is_none());
    }
}
