use log::{info, warn};
use smallvec::SmallVec;
use thiserror::Error;

pub const PLAYFIELD_WIDTH: f32 = 512.0;
pub const PLAYFIELD_HEIGHT: f32 = 384.0;

const HIT_OBJECTS_HEADER: &str = "[HitObjects]";

// Object-type bitmask, tested in this priority order. Some charts set more
// than one bit (new-combo markers share the field); the lowest matching bit
// wins, which is the behavior stock charts rely on.
const TYPE_CIRCLE: u32 = 1 << 0;
const TYPE_SLIDER: u32 = 1 << 1;
const TYPE_SPINNER: u32 = 1 << 3;

#[derive(Debug, Error)]
pub enum BeatmapError {
    #[error("no [HitObjects] section in beatmap text")]
    MissingHitObjects,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveType {
    Bezier,
    Catmull,
    Linear,
    PerfectCircle,
}

impl CurveType {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "B" => Some(Self::Bezier),
            "C" => Some(Self::Catmull),
            "L" => Some(Self::Linear),
            "P" => Some(Self::PerfectCircle),
            _ => None,
        }
    }
}

/// One chart target. Coordinates are playfield space (0..512 x 0..384),
/// times are milliseconds from song start.
#[derive(Debug, Clone, PartialEq)]
pub enum HitObject {
    Circle {
        x: i32,
        y: i32,
        time: i32,
    },
    Slider {
        x: i32,
        y: i32,
        time: i32,
        curve: CurveType,
        control_points: SmallVec<[(i32, i32); 8]>,
        repeat: i32,
        pixel_length: f32,
    },
    Spinner {
        x: i32,
        y: i32,
        time: i32,
        end_time: i32,
    },
}

impl HitObject {
    #[inline(always)]
    pub const fn x(&self) -> i32 {
        match self {
            Self::Circle { x, .. } | Self::Slider { x, .. } | Self::Spinner { x, .. } => *x,
        }
    }

    #[inline(always)]
    pub const fn y(&self) -> i32 {
        match self {
            Self::Circle { y, .. } | Self::Slider { y, .. } | Self::Spinner { y, .. } => *y,
        }
    }

    #[inline(always)]
    pub const fn time(&self) -> i32 {
        match self {
            Self::Circle { time, .. } | Self::Slider { time, .. } | Self::Spinner { time, .. } => {
                *time
            }
        }
    }
}

/// An immutable, source-ordered sequence of hit objects. Charts are authored
/// time-sorted; the parser preserves whatever order the file has.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Beatmap {
    pub hit_objects: Vec<HitObject>,
}

impl Beatmap {
    /// Parses the `[HitObjects]` section of a .osu text blob. Unparseable
    /// lines are skipped with a warning; only a missing section is fatal.
    /// A present-but-empty section yields an empty beatmap.
    pub fn parse(text: &str) -> Result<Self, BeatmapError> {
        let Some(at) = text.find(HIT_OBJECTS_HEADER) else {
            return Err(BeatmapError::MissingHitObjects);
        };
        let body = &text[at + HIT_OBJECTS_HEADER.len()..];

        let mut hit_objects = Vec::new();
        let mut skipped = 0usize;
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_object_line(line) {
                Some(obj) => hit_objects.push(obj),
                None => {
                    skipped += 1;
                    warn!("Skipping unparseable hit object line: {line}");
                }
            }
        }

        info!(
            "Parsed {} hit objects ({} lines skipped)",
            hit_objects.len(),
            skipped
        );
        Ok(Self { hit_objects })
    }
}

fn parse_object_line(line: &str) -> Option<HitObject> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 4 {
        return None;
    }
    let x = parts[0].trim().parse::<i32>().ok()?;
    let y = parts[1].trim().parse::<i32>().ok()?;
    let time = parts[2].trim().parse::<i32>().ok()?;
    let object_type = parts[3].trim().parse::<u32>().ok()?;

    if object_type & TYPE_CIRCLE != 0 {
        Some(HitObject::Circle { x, y, time })
    } else if object_type & TYPE_SLIDER != 0 {
        let mut segments = parts.get(5)?.split('|');
        let curve = CurveType::from_tag(segments.next()?.trim())?;
        let mut control_points = SmallVec::new();
        for point in segments {
            let (px, py) = point.split_once(':')?;
            control_points.push((px.trim().parse().ok()?, py.trim().parse().ok()?));
        }
        let repeat = parts.get(6)?.trim().parse::<i32>().ok()?;
        let pixel_length = parts.get(7)?.trim().parse::<f32>().ok()?;
        Some(HitObject::Slider {
            x,
            y,
            time,
            curve,
            control_points,
            repeat,
            pixel_length,
        })
    } else if object_type & TYPE_SPINNER != 0 {
        let end_time = parts.get(5)?.trim().parse::<i32>().ok()?;
        Some(HitObject::Spinner {
            x,
            y,
            time,
            end_time,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{Beatmap, BeatmapError, CurveType, HitObject};

    const HEADER: &str = "osu file format v14\n\n[Metadata]\nTitle:test\n\n[HitObjects]\n";

    #[test]
    fn circle_line_parses() {
        let map = Beatmap::parse(&format!("{HEADER}256,192,1000,1,0\n")).unwrap();
        assert_eq!(
            map.hit_objects,
            vec![HitObject::Circle {
                x: 256,
                y: 192,
                time: 1000
            }]
        );
    }

    #[test]
    fn slider_line_parses() {
        let map =
            Beatmap::parse(&format!("{HEADER}100,100,500,2,0,B|150:150|200:100,2,150.5\n"))
                .unwrap();
        match &map.hit_objects[0] {
            HitObject::Slider {
                x,
                y,
                time,
                curve,
                control_points,
                repeat,
                pixel_length,
            } => {
                assert_eq!((*x, *y, *time), (100, 100, 500));
                assert_eq!(*curve, CurveType::Bezier);
                assert_eq!(control_points.to_vec(), vec![(150, 150), (200, 100)]);
                assert_eq!(*repeat, 2);
                assert_eq!(*pixel_length, 150.5);
            }
            other => panic!("expected a slider, got {other:?}"),
        }
    }

    #[test]
    fn spinner_line_parses() {
        let map = Beatmap::parse(&format!("{HEADER}256,192,3000,8,0,5000\n")).unwrap();
        assert_eq!(
            map.hit_objects,
            vec![HitObject::Spinner {
                x: 256,
                y: 192,
                time: 3000,
                end_time: 5000
            }]
        );
    }

    #[test]
    fn missing_section_is_fatal() {
        assert!(matches!(
            Beatmap::parse("osu file format v14\n[Metadata]\n"),
            Err(BeatmapError::MissingHitObjects)
        ));
    }

    #[test]
    fn empty_section_is_an_empty_beatmap() {
        let map = Beatmap::parse(HEADER).unwrap();
        assert!(map.hit_objects.is_empty());
    }

    #[test]
    fn short_and_malformed_lines_are_skipped() {
        let text = format!(
            "{HEADER}1,2,3\nnot,numbers,at,all\n256,192,1000,1,0\n100,100,500,2,0,Z|1:2,1,10\n"
        );
        let map = Beatmap::parse(&text).unwrap();
        assert_eq!(
            map.hit_objects.len(),
            1,
            "only the well-formed circle line should survive"
        );
    }

    #[test]
    fn circle_bit_wins_over_other_bits() {
        // Type 5 = circle bit + new-combo bit; type 11 sets circle, slider
        // context bits and spinner. Circle is tested first in both cases.
        let map = Beatmap::parse(&format!("{HEADER}10,20,30,5,0\n10,20,30,11,0,99\n")).unwrap();
        assert!(
            map.hit_objects
                .iter()
                .all(|o| matches!(o, HitObject::Circle { .. })),
            "lowest-numbered matching type bit must win"
        );
    }

    #[test]
    fn slider_bit_wins_over_spinner_bit() {
        let map =
            Beatmap::parse(&format!("{HEADER}10,20,30,10,0,L|40:50,1,60.0\n")).unwrap();
        assert!(matches!(map.hit_objects[0], HitObject::Slider { .. }));
    }

    #[test]
    fn parsing_is_idempotent() {
        let text = format!(
            "{HEADER}256,192,1000,1,0\n100,100,500,2,0,B|150:150|200:100,2,150.5\n256,192,3000,8,0,5000\n"
        );
        let a = Beatmap::parse(&text).unwrap();
        let b = Beatmap::parse(&text).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn source_order_is_preserved() {
        // Out-of-order times are a chart-authoring bug, not ours to repair.
        let map = Beatmap::parse(&format!("{HEADER}0,0,2000,1,0\n0,0,1000,1,0\n")).unwrap();
        assert_eq!(map.hit_objects[0].time(), 2000);
        assert_eq!(map.hit_objects[1].time(), 1000);
    }
}
