pub mod family_a;
pub mod family_b;
pub mod family_c;

use crate::config::Family;
use crate::stick::StickRange;

pub fn stick_range_for(family: Family) -> StickRange {
    match family {
        Family::A => family_a::STICK_RANGE,
        Family::B => family_b::STICK_RANGE,
        Family::C => family_c::STICK_RANGE,
    }
}
