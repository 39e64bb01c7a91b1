use crate::game::mods::Mods;
use bitflags::bitflags;
use chrono::{DateTime, TimeZone, Utc};
use log::{info, warn};
use std::path::Path;
use thiserror::Error;

pub const MODE_STANDARD: u8 = 0;

// .NET ticks (100ns units since 0001-01-01) at the Unix epoch; replay
// timestamps are stored in ticks.
const TICKS_AT_UNIX_EPOCH: i64 = 621_355_968_000_000_000;
const TICKS_PER_SECOND: i64 = 10_000_000;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("replay data ended unexpectedly at byte offset {0}")]
    UnexpectedEof(usize),
    #[error("unsupported game mode tag {0} (only osu!standard replays are supported)")]
    UnsupportedMode(u8),
    #[error("corrupt replay: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

bitflags! {
    /// Pressed-button state carried by every cursor frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Keys: u32 {
        const M1    = 1 << 0;
        const M2    = 1 << 1;
        const K1    = 1 << 2;
        const K2    = 1 << 3;
        const SMOKE = 1 << 4;
    }
}

/// One recorded input frame. `time_delta` is milliseconds since the previous
/// frame (the first frame is relative to recording start). Zero and negative
/// deltas occur in real recordings and are preserved as-is; the playback
/// clock decides how they advance time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayFrame {
    pub time_delta: i64,
    pub x: f32,
    pub y: f32,
    pub keys: Keys,
}

/// A parsed recording: session metadata plus the ordered cursor-frame
/// stream. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Replay {
    pub game_version: i32,
    pub beatmap_hash: String,
    pub player_name: String,
    pub replay_hash: String,
    pub count_300: u16,
    pub count_100: u16,
    pub count_50: u16,
    pub count_geki: u16,
    pub count_katu: u16,
    pub count_miss: u16,
    pub score: i32,
    pub max_combo: u16,
    pub perfect: bool,
    pub mods: Mods,
    pub life_graph: String,
    pub timestamp_ticks: i64,
    pub frames: Vec<ReplayFrame>,
}

impl Replay {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ReplayError> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    /// Decodes the .osr container: header fields, then a length-prefixed
    /// stream of `delta|x|y|keys` frame records separated by commas.
    pub fn parse(bytes: &[u8]) -> Result<Self, ReplayError> {
        let mut r = ByteReader::new(bytes);

        let mode = r.read_u8()?;
        if mode != MODE_STANDARD {
            return Err(ReplayError::UnsupportedMode(mode));
        }
        let game_version = r.read_i32()?;
        let beatmap_hash = r.read_string()?;
        let player_name = r.read_string()?;
        let replay_hash = r.read_string()?;
        let count_300 = r.read_u16()?;
        let count_100 = r.read_u16()?;
        let count_50 = r.read_u16()?;
        let count_geki = r.read_u16()?;
        let count_katu = r.read_u16()?;
        let count_miss = r.read_u16()?;
        let score = r.read_i32()?;
        let max_combo = r.read_u16()?;
        let perfect = r.read_u8()? != 0;
        let raw_mods = r.read_u32()?;
        let life_graph = r.read_string()?;
        let timestamp_ticks = r.read_i64()?;

        let data_len = r.read_i32()?;
        if data_len < 0 {
            return Err(ReplayError::Corrupt(format!(
                "negative frame-stream length {data_len}"
            )));
        }
        let data = r.read_bytes(data_len as usize)?;
        let frames = parse_frames(data)?;

        info!(
            "Parsed replay by {player_name}: score {score}, {} frames",
            frames.len()
        );
        Ok(Self {
            game_version,
            beatmap_hash,
            player_name,
            replay_hash,
            count_300,
            count_100,
            count_50,
            count_geki,
            count_katu,
            count_miss,
            score,
            max_combo,
            perfect,
            mods: Mods::from_bits_retain(raw_mods),
            life_graph,
            timestamp_ticks,
            frames,
        })
    }

    /// When the replay was set, if the stored tick count is representable.
    pub fn set_on(&self) -> Option<DateTime<Utc>> {
        let rel = self.timestamp_ticks.checked_sub(TICKS_AT_UNIX_EPOCH)?;
        let secs = rel.div_euclid(TICKS_PER_SECOND);
        let nanos = (rel.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
        Utc.timestamp_opt(secs, nanos).single()
    }
}

fn parse_frames(data: &[u8]) -> Result<Vec<ReplayFrame>, ReplayError> {
    let text = std::str::from_utf8(data)
        .map_err(|e| ReplayError::Corrupt(format!("frame stream is not ASCII: {e}")))?;

    let mut frames = Vec::new();
    for record in text.split(',') {
        if record.is_empty() {
            // Trailing separator after the final record.
            continue;
        }
        let mut fields = record.split('|');
        let (Some(delta), Some(x), Some(y), Some(keys)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            return Err(ReplayError::Corrupt(format!(
                "frame record has fewer than 4 fields: {record:?}"
            )));
        };
        let frame = ReplayFrame {
            time_delta: delta
                .parse()
                .map_err(|_| ReplayError::Corrupt(format!("bad frame delta {delta:?}")))?,
            x: x.parse()
                .map_err(|_| ReplayError::Corrupt(format!("bad frame x {x:?}")))?,
            y: y.parse()
                .map_err(|_| ReplayError::Corrupt(format!("bad frame y {y:?}")))?,
            keys: keys
                .parse::<u32>()
                .map(Keys::from_bits_retain)
                .map_err(|_| ReplayError::Corrupt(format!("bad frame key state {keys:?}")))?,
        };
        if frame.time_delta < 0 {
            // Real recordings carry these (including the trailing RNG-seed
            // record); keep them and let the clock clamp progress.
            warn!("Frame with negative time delta {}", frame.time_delta);
        }
        frames.push(frame);
    }
    Ok(frames)
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ReplayError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(ReplayError::UnexpectedEof(self.pos))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, ReplayError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, ReplayError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, ReplayError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i32(&mut self) -> Result<i32, ReplayError> {
        Ok(self.read_u32()? as i32)
    }

    fn read_i64(&mut self) -> Result<i64, ReplayError> {
        let b = self.read_bytes(8)?;
        Ok(i64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_uleb128(&mut self) -> Result<u64, ReplayError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift >= 64 {
                return Err(ReplayError::Corrupt(
                    "ULEB128 length does not terminate".to_string(),
                ));
            }
        }
    }

    /// osu!-string: 0x00 for empty, or 0x0b + ULEB128 byte length + UTF-8.
    fn read_string(&mut self) -> Result<String, ReplayError> {
        match self.read_u8()? {
            0x00 => Ok(String::new()),
            0x0b => {
                let len = self.read_uleb128()? as usize;
                let bytes = self.read_bytes(len)?;
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| ReplayError::Corrupt(format!("string is not UTF-8: {e}")))
            }
            other => Err(ReplayError::Corrupt(format!(
                "bad string prefix byte 0x{other:02x}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Keys, MODE_STANDARD, Replay, ReplayError, ReplayFrame};
    use crate::game::mods::Mods;

    fn push_string(out: &mut Vec<u8>, s: &str) {
        if s.is_empty() {
            out.push(0x00);
            return;
        }
        out.push(0x0b);
        // Test strings stay under 128 bytes, one ULEB128 byte suffices.
        out.push(s.len() as u8);
        out.extend_from_slice(s.as_bytes());
    }

    fn replay_bytes(mode: u8, mods: u32, frame_text: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(mode);
        out.extend_from_slice(&20231001i32.to_le_bytes()); // game version
        push_string(&mut out, "aabbccddeeff00112233445566778899"); // beatmap hash
        push_string(&mut out, "cookiezi");
        push_string(&mut out, "99887766554433221100ffeeddccbbaa"); // replay hash
        for count in [100u16, 5, 1, 20, 3, 0] {
            out.extend_from_slice(&count.to_le_bytes());
        }
        out.extend_from_slice(&7_654_321i32.to_le_bytes()); // score
        out.extend_from_slice(&321u16.to_le_bytes()); // max combo
        out.push(1); // perfect
        out.extend_from_slice(&mods.to_le_bytes());
        push_string(&mut out, ""); // life graph
        out.extend_from_slice(&638_000_000_000_000_000i64.to_le_bytes());
        out.extend_from_slice(&(frame_text.len() as i32).to_le_bytes());
        out.extend_from_slice(frame_text.as_bytes());
        out
    }

    #[test]
    fn header_and_frames_decode() {
        let bytes = replay_bytes(MODE_STANDARD, Mods::HIDDEN.bits(), "0|256|192|0,16|300.5|200|1,");
        let replay = Replay::parse(&bytes).unwrap();
        assert_eq!(replay.player_name, "cookiezi");
        assert_eq!(replay.score, 7_654_321);
        assert_eq!(replay.max_combo, 321);
        assert!(replay.perfect);
        assert_eq!(replay.beatmap_hash, "aabbccddeeff00112233445566778899");
        assert_eq!(replay.mods, Mods::HIDDEN);
        assert_eq!(
            replay.frames,
            vec![
                ReplayFrame {
                    time_delta: 0,
                    x: 256.0,
                    y: 192.0,
                    keys: Keys::empty()
                },
                ReplayFrame {
                    time_delta: 16,
                    x: 300.5,
                    y: 200.0,
                    keys: Keys::M1
                },
            ]
        );
        assert!(replay.set_on().is_some());
    }

    #[test]
    fn non_standard_mode_is_rejected() {
        let bytes = replay_bytes(3, 0, "");
        assert!(matches!(
            Replay::parse(&bytes),
            Err(ReplayError::UnsupportedMode(3))
        ));
    }

    #[test]
    fn truncated_input_is_eof_not_panic() {
        let bytes = replay_bytes(MODE_STANDARD, 0, "0|1|2|0,");
        for cut in [0, 1, 5, 20, bytes.len() - 1] {
            assert!(
                matches!(
                    Replay::parse(&bytes[..cut]),
                    Err(ReplayError::UnexpectedEof(_))
                ),
                "cut at {cut} should report EOF"
            );
        }
    }

    #[test]
    fn truncated_uleb128_length_is_eof() {
        let mut bytes = vec![MODE_STANDARD];
        bytes.extend_from_slice(&0i32.to_le_bytes());
        // String length whose continuation bytes run off the end of the data.
        bytes.extend_from_slice(&[0x0b, 0x80, 0x80, 0x80]);
        assert!(matches!(
            Replay::parse(&bytes),
            Err(ReplayError::UnexpectedEof(_))
        ));
    }

    #[test]
    fn runaway_uleb128_length_is_corrupt() {
        let mut bytes = vec![MODE_STANDARD];
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.push(0x0b);
        // Enough continuation bytes to shift past 64 bits without ever
        // terminating.
        bytes.extend_from_slice(&[0x80; 12]);
        assert!(matches!(Replay::parse(&bytes), Err(ReplayError::Corrupt(_))));
    }

    #[test]
    fn bad_string_prefix_is_corrupt() {
        let mut bytes = replay_bytes(MODE_STANDARD, 0, "");
        // First string prefix sits right after mode (1) + version (4).
        bytes[5] = 0x07;
        assert!(matches!(Replay::parse(&bytes), Err(ReplayError::Corrupt(_))));
    }

    #[test]
    fn negative_and_zero_deltas_are_preserved() {
        let bytes = replay_bytes(MODE_STANDARD, 0, "0|1|1|0,-3|2|2|0,0|3|3|0,-12345|0|0|9876");
        let replay = Replay::parse(&bytes).unwrap();
        let deltas: Vec<i64> = replay.frames.iter().map(|f| f.time_delta).collect();
        assert_eq!(deltas, vec![0, -3, 0, -12345], "no coalescing, no dropping");
    }

    #[test]
    fn garbage_frame_record_is_corrupt() {
        let bytes = replay_bytes(MODE_STANDARD, 0, "0|x|1|0,");
        assert!(matches!(Replay::parse(&bytes), Err(ReplayError::Corrupt(_))));
    }

    #[test]
    fn unknown_mod_bits_survive_the_round_trip() {
        let raw = Mods::HARD_ROCK.bits() | 0x8000_0000;
        let bytes = replay_bytes(MODE_STANDARD, raw, "");
        let replay = Replay::parse(&bytes).unwrap();
        assert_eq!(replay.mods.bits(), raw);
    }
}
