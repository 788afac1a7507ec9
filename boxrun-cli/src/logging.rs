// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

use log::LevelFilter;

/// One invocation, one exec: there is no long-running progress UI to keep
/// log lines from corrupting, so a plain filtered logger is the right-sized
/// setup here.
pub(crate) fn setup(level: LevelFilter) {
    pretty_env_logger::formatted_builder()
        .filter_level(level)
        .init();
}
