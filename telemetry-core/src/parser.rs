// GT7 telemetry parser.
// Invariants: every rejection is a `None`; no input length or content can panic here.

use crate::constants::{CAR_ID_OFFSET, FULL_PACKET_SIZE, MAGIC, MIN_PACKET_SIZE};
use crate::crypto;
use crate::model::VehicleSample;
use crate::packet::PACKAGE_ID_OFFSET;

const POS_X: usize = 0x04;
const POS_Y: usize = 0x08;
const POS_Z: usize = 0x0C;
const RPM: usize = 0x3C;
const FUEL_CURRENT: usize = 0x44;
const FUEL_CAPACITY: usize = 0x48;
const SPEED_MS: usize = 0x4C;
const CURRENT_LAP: usize = 0x74;
const TOTAL_LAPS: usize = 0x76;
const BEST_LAP_MS: usize = 0x78;
const LAST_LAP_MS: usize = 0x7C;
const TIME_ON_TRACK_MS: usize = 0x80;
const FLAGS: usize = 0x8E;
const GEAR: usize = 0x90;
const THROTTLE: usize = 0x91;
const BRAKE: usize = 0x92;

const FLAG_IN_RACE: u8 = 0b0000_0001;
const FLAG_PAUSED: u8 = 0b0000_0010;
const MS_TO_KMH: f32 = 3.6;
const PEDAL_SCALE: f32 = 2.55;

/// Decrypts and parses one datagram. The timestamp is left at zero for the caller to stamp.
pub fn decode(raw: &[u8]) -> Option<VehicleSample> {
    let payload = crypto::decrypt_packet(raw)?;
    parse_sample(&payload)
}

pub fn parse_sample(payload: &[u8]) -> Option<VehicleSample> {
    if payload.len() < MIN_PACKET_SIZE {
        return None;
    }

    let gear_byte = read_u8(payload, GEAR)?;
    let flags = read_u8(payload, FLAGS)?;
    let sample = VehicleSample {
        timestamp_ms: 0,
        package_id: read_u32(payload, PACKAGE_ID_OFFSET)?,
        lap: read_i16(payload, CURRENT_LAP)?,
        total_laps: read_i16(payload, TOTAL_LAPS)?,
        best_lap_ms: read_i32(payload, BEST_LAP_MS)?,
        last_lap_ms: read_i32(payload, LAST_LAP_MS)?,
        time_on_track_ms: read_i32(payload, TIME_ON_TRACK_MS)?,
        speed_kmh: read_f32(payload, SPEED_MS)? * MS_TO_KMH,
        rpm: read_f32(payload, RPM)?,
        throttle: read_u8(payload, THROTTLE)? as f32 / PEDAL_SCALE,
        brake: read_u8(payload, BRAKE)? as f32 / PEDAL_SCALE,
        gear: gear_byte & 0x0F,
        suggested_gear: gear_byte >> 4,
        fuel: read_f32(payload, FUEL_CURRENT)?,
        fuel_capacity: read_f32(payload, FUEL_CAPACITY)?,
        x: read_f32(payload, POS_X)?,
        y: read_f32(payload, POS_Y)?,
        z: read_f32(payload, POS_Z)?,
        in_race: flags & FLAG_IN_RACE != 0,
        paused: flags & FLAG_PAUSED != 0,
        car_id: read_i32(payload, CAR_ID_OFFSET),
    };

    let finite = [sample.x, sample.y, sample.z, sample.speed_kmh, sample.rpm]
        .iter()
        .all(|value| value.is_finite());
    if !finite {
        return None;
    }

    Some(sample)
}

/// Writes a sample back into the plaintext wire layout (magic included), for replay fixtures.
pub fn encode_sample(sample: &VehicleSample) -> Vec<u8> {
    let mut out = vec![0u8; FULL_PACKET_SIZE];
    out[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    write(&mut out, POS_X, &sample.x.to_le_bytes());
    write(&mut out, POS_Y, &sample.y.to_le_bytes());
    write(&mut out, POS_Z, &sample.z.to_le_bytes());
    write(&mut out, RPM, &sample.rpm.to_le_bytes());
    write(&mut out, FUEL_CURRENT, &sample.fuel.to_le_bytes());
    write(&mut out, FUEL_CAPACITY, &sample.fuel_capacity.to_le_bytes());
    write(&mut out, SPEED_MS, &(sample.speed_kmh / MS_TO_KMH).to_le_bytes());
    write(&mut out, PACKAGE_ID_OFFSET, &sample.package_id.to_le_bytes());
    write(&mut out, CURRENT_LAP, &sample.lap.to_le_bytes());
    write(&mut out, TOTAL_LAPS, &sample.total_laps.to_le_bytes());
    write(&mut out, BEST_LAP_MS, &sample.best_lap_ms.to_le_bytes());
    write(&mut out, LAST_LAP_MS, &sample.last_lap_ms.to_le_bytes());
    write(&mut out, TIME_ON_TRACK_MS, &sample.time_on_track_ms.to_le_bytes());

    let mut flags = 0u8;
    if sample.in_race {
        flags |= FLAG_IN_RACE;
    }
    if sample.paused {
        flags |= FLAG_PAUSED;
    }
    out[FLAGS] = flags;
    out[GEAR] = (sample.gear & 0x0F) | (sample.suggested_gear << 4);
    out[THROTTLE] = pedal_byte(sample.throttle);
    out[BRAKE] = pedal_byte(sample.brake);

    match sample.car_id {
        Some(car_id) => write(&mut out, CAR_ID_OFFSET, &car_id.to_le_bytes()),
        None => out.truncate(CAR_ID_OFFSET),
    }
    out
}

fn pedal_byte(pct: f32) -> u8 {
    (pct * PEDAL_SCALE).round().clamp(0.0, 255.0) as u8
}

fn write(out: &mut [u8], offset: usize, bytes: &[u8]) {
    out[offset..offset + bytes.len()].copy_from_slice(bytes);
}

pub(crate) fn read_f32(payload: &[u8], offset: usize) -> Option<f32> {
    let bytes = payload.get(offset..offset + 4)?;
    Some(f32::from_le_bytes(bytes.try_into().ok()?))
}

pub(crate) fn read_u8(payload: &[u8], offset: usize) -> Option<u8> {
    payload.get(offset).copied()
}

pub(crate) fn read_i16(payload: &[u8], offset: usize) -> Option<i16> {
    let bytes = payload.get(offset..offset + 2)?;
    Some(i16::from_le_bytes(bytes.try_into().ok()?))
}

pub(crate) fn read_i32(payload: &[u8], offset: usize) -> Option<i32> {
    let bytes = payload.get(offset..offset + 4)?;
    Some(i32::from_le_bytes(bytes.try_into().ok()?))
}

pub(crate) fn read_u32(payload: &[u8], offset: usize) -> Option<u32> {
    let bytes = payload.get(offset..offset + 4)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}
