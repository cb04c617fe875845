/*!
# Vibewatch DevKit - simulators and test utilities

Helps develop and test the monitor without hardware:
- Simulated signal-light controller speaking the real serial protocol
- Builders for measurement series and scenarios
- Harness with a throw-away control file and output expectations
*/

pub mod device_stub;
pub mod fixtures;
pub mod test_utils;

pub use device_stub::{DeviceEvent, MockIndicator, ReplyMode};
pub use fixtures::{ScenarioBuilder, SeriesBuilder};
pub use test_utils::TestHarness;
