/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use aws_smithy_async::time::TimeSource;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// Time source that can be manually moved for tests
#[derive(Clone, Debug)]
pub(crate) struct TestingTimeSource {
    queries: Arc<Mutex<Vec<SystemTime>>>,
    now: Arc<Mutex<SystemTime>>,
}

impl TestingTimeSource {
    /// Creates `TestingTimeSource` with `start_time`.
    pub(crate) fn new(start_time: SystemTime) -> Self {
        Self {
            queries: Default::default(),
            now: Arc::new(Mutex::new(start_time)),
        }
    }

    /// Sets time to the specified `time`.
    pub(crate) fn set_time(&self, time: SystemTime) {
        let mut now = self.now.lock().unwrap();
        *now = time;
    }

    /// Advances time by `delta`.
    pub(crate) fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }

    /// Number of times the current time has been read.
    pub(crate) fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

impl TimeSource for TestingTimeSource {
    fn now(&self) -> SystemTime {
        let ts = *self.now.lock().unwrap();
        self.queries.lock().unwrap().push(ts);
        ts
    }
}

#[cfg(test)]
mod test {
    use super::TestingTimeSource;
    use aws_smithy_async::time::TimeSource;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn testing_time_source_should_behave_as_expected() {
        let time_source = TestingTimeSource::new(UNIX_EPOCH);
        assert_eq!(time_source.now(), UNIX_EPOCH);
        time_source.advance(Duration::from_secs(10));
        assert_eq!(time_source.now(), UNIX_EPOCH + Duration::from_secs(10));
        time_source.set_time(UNIX_EPOCH);
        assert_eq!(time_source.now(), UNIX_EPOCH);
        assert_eq!(3, time_source.query_count());
    }
}
