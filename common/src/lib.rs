// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

pub mod components;
pub mod numutil;

/// Signed cycle count used by the cores for event scheduling.
/// Event times are countdowns relative to the current CPU slice, so
/// negative values (the "slack" of an event that already happened) are
/// meaningful and must survive arithmetic unchanged.
pub type Cycles = i32;

/// Sentinel returned by a subsystem with no event pending.
pub const NO_EVENT: Cycles = Cycles::MAX;
