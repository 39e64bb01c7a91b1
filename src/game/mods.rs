use crate::game::beatmap::{PLAYFIELD_HEIGHT, PLAYFIELD_WIDTH};
use bitflags::bitflags;

bitflags! {
    /// Gameplay modifier bitmask as stored in the replay header.
    ///
    /// The layout is the stable osu! flag order; bits this viewer does not
    /// act on are still round-tripped so the header can be displayed and
    /// re-saved faithfully.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mods: u32 {
        const NO_FAIL      = 1 << 0;
        const EASY         = 1 << 1;
        const TOUCH_DEVICE = 1 << 2;
        const HIDDEN       = 1 << 3;
        const HARD_ROCK    = 1 << 4;
        const SUDDEN_DEATH = 1 << 5;
        const DOUBLE_TIME  = 1 << 6;
        const RELAX        = 1 << 7;
        const HALF_TIME    = 1 << 8;
        const NIGHTCORE    = 1 << 9;
        const FLASHLIGHT   = 1 << 10;
        const AUTOPLAY     = 1 << 11;
        const SPUN_OUT     = 1 << 12;
        const AUTOPILOT    = 1 << 13;
        const PERFECT      = 1 << 14;
        const KEY4         = 1 << 15;
        const KEY5         = 1 << 16;
        const KEY6         = 1 << 17;
        const KEY7         = 1 << 18;
        const KEY8         = 1 << 19;
        const FADE_IN      = 1 << 20;
        const RANDOM       = 1 << 21;
        const CINEMA       = 1 << 22;
        const TARGET       = 1 << 23;
        const KEY9         = 1 << 24;
        const KEY_COOP     = 1 << 25;
        const KEY1         = 1 << 26;
        const KEY3         = 1 << 27;
        const KEY2         = 1 << 28;
        const SCORE_V2     = 1 << 29;
        const MIRROR       = 1 << 30;
    }
}

impl Mods {
    /// The mods the viewer exposes as live toggles, in display order.
    pub const TOGGLEABLE: [(Mods, &'static str); 5] = [
        (Mods::HARD_ROCK, "HR"),
        (Mods::HIDDEN, "HD"),
        (Mods::DOUBLE_TIME, "DT"),
        (Mods::MIRROR, "MR"),
        (Mods::HALF_TIME, "HT"),
    ];

    /// Applies the active spatial and temporal transforms to one point in
    /// playfield space. Spatial flips are evaluated first and combine;
    /// DoubleTime wins over HalfTime when both bits are set. Nightcore uses
    /// the DoubleTime clock (stock replays set both bits together).
    ///
    /// Every cursor frame and every hit object of a tick must pass through
    /// this one function with the same mod set.
    #[inline(always)]
    pub fn apply(self, x: f32, y: f32, time: f64) -> (f32, f32, f64) {
        let mut x = x;
        let mut y = y;
        if self.contains(Mods::HARD_ROCK) {
            y = PLAYFIELD_HEIGHT - y;
        }
        if self.contains(Mods::MIRROR) {
            x = PLAYFIELD_WIDTH - x;
        }
        let time = if self.intersects(Mods::DOUBLE_TIME | Mods::NIGHTCORE) {
            time * (2.0 / 3.0)
        } else if self.contains(Mods::HALF_TIME) {
            time * (4.0 / 3.0)
        } else {
            time
        };
        (x, y, time)
    }

    /// Short display string ("HR,HD" style) for the overlay; "NM" when empty.
    pub fn label(self) -> String {
        if self.is_empty() {
            return "NM".to_string();
        }
        let mut parts: Vec<&str> = Vec::new();
        for (flag, name) in Self::TOGGLEABLE {
            if self.contains(flag) {
                parts.push(name);
            }
        }
        if self.contains(Mods::NIGHTCORE) {
            parts.push("NC");
        }
        if parts.is_empty() {
            // Only bits we do not toggle (NoFail, key mods, ...).
            return format!("0x{:x}", self.bits());
        }
        parts.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::Mods;

    #[test]
    fn hard_rock_flips_y_only() {
        let (x, y, t) = Mods::HARD_ROCK.apply(100.0, 100.0, 900.0);
        assert_eq!(x, 100.0);
        assert_eq!(y, 284.0, "HardRock should mirror y across the playfield");
        assert_eq!(t, 900.0);
    }

    #[test]
    fn mirror_flips_x_only() {
        let (x, y, t) = Mods::MIRROR.apply(100.0, 100.0, 900.0);
        assert_eq!(x, 412.0, "Mirror should mirror x across the playfield");
        assert_eq!(y, 100.0);
        assert_eq!(t, 900.0);
    }

    #[test]
    fn double_time_scales_time() {
        let (x, y, t) = Mods::DOUBLE_TIME.apply(100.0, 100.0, 900.0);
        assert_eq!((x, y), (100.0, 100.0));
        assert_eq!(t, 600.0);
    }

    #[test]
    fn half_time_scales_time() {
        let (_, _, t) = Mods::HALF_TIME.apply(0.0, 0.0, 900.0);
        assert_eq!(t, 1200.0);
    }

    #[test]
    fn double_time_wins_over_half_time() {
        let both = Mods::DOUBLE_TIME | Mods::HALF_TIME;
        let (_, _, t) = both.apply(0.0, 0.0, 900.0);
        assert_eq!(t, 600.0, "DT must take precedence when both bits are set");
    }

    #[test]
    fn nightcore_uses_double_time_clock() {
        let (_, _, t) = Mods::NIGHTCORE.apply(0.0, 0.0, 900.0);
        assert_eq!(t, 600.0);
    }

    #[test]
    fn spatial_flips_commute() {
        let combined = (Mods::HARD_ROCK | Mods::MIRROR).apply(37.0, 222.0, 1234.0);
        let (mx, my, mt) = Mods::HARD_ROCK.apply(37.0, 222.0, 1234.0);
        let chained = Mods::MIRROR.apply(mx, my, mt);
        assert_eq!(combined, chained);
        let (hx, hy, ht) = Mods::MIRROR.apply(37.0, 222.0, 1234.0);
        let chained_other_way = Mods::HARD_ROCK.apply(hx, hy, ht);
        assert_eq!(combined, chained_other_way);
    }

    #[test]
    fn unknown_bits_are_retained() {
        let raw = Mods::from_bits_retain(0x8000_0000 | Mods::HIDDEN.bits());
        assert!(raw.contains(Mods::HIDDEN));
        assert_eq!(raw.bits() & 0x8000_0000, 0x8000_0000);
    }

    #[test]
    fn label_names_active_toggles() {
        assert_eq!(Mods::empty().label(), "NM");
        assert_eq!((Mods::HARD_ROCK | Mods::HIDDEN).label(), "HR,HD");
    }
}
