//! 주기적 통계 이벤트
//!
//! 매 주기마다 리포터가 라우터 카운터의 스냅샷을 떠서
//! `firehose_to_syslog_stats` 이벤트를 shipper로 직접 보냅니다.
//! 이 이벤트는 선택, 필터링, 카운트 대상이 아닙니다.

use std::sync::Arc;
use std::time::Duration;

use firehose_core::event::Event;
use firehose_core::metrics as m;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::routing::EventRouter;

pub const STATS_EVENT_TYPE: &str = "firehose_to_syslog_stats";
pub const STATS_MESSAGE: &str = "Statistic for firehose to syslog";

pub const FIELD_TOTAL_COUNT: &str = "total_count";
pub const FIELD_RATE: &str = "by_sec_Events";
pub const FIELD_TOTAL_ELAPSED: &str = "total_elapsed_secs";

pub struct StatsReporter {
    router: Arc<EventRouter>,
    started: Instant,
    last_tick: Instant,
    last_total: u64,
}

impl StatsReporter {
    pub fn new(router: Arc<EventRouter>) -> Self {
        Self::starting_at(router, Instant::now())
    }

    fn starting_at(router: Arc<EventRouter>, now: Instant) -> Self {
        Self {
            router,
            started: now,
            last_tick: now,
            last_total: 0,
        }
    }

    /// 현재 런타임에 리포터를 spawn합니다.
    pub fn spawn(
        router: Arc<EventRouter>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let reporter = Self::new(router);
        tokio::spawn(reporter.run(period, cancel))
    }

    /// 취소될 때까지 `period`마다 통계 이벤트를 하나씩 보냅니다.
    pub async fn run(mut self, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 첫 tick은 즉시 완료됨
        ticker.tick().await;

        info!(interval_secs = period.as_secs(), "stats reporter started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let event = self.tick(Instant::now());
                    self.router.shipper().ship_events(event.fields, &event.msg);
                    metrics::counter!(m::STATS_EVENTS_EMITTED_TOTAL).increment(1);
                }
                _ = cancel.cancelled() => {
                    info!("stats reporter stopped");
                    break;
                }
            }
        }
    }

    /// `now` 시점 tick의 통계 이벤트를 만들고 기준점을 갱신합니다.
    pub fn tick(&mut self, now: Instant) -> Event {
        let snapshot = self.router.counters_snapshot();
        let elapsed = round_down_tenth(now.saturating_duration_since(self.last_tick));
        let total_elapsed = round_down_tenth(now.saturating_duration_since(self.started));

        let mut event = Event::new(STATS_EVENT_TYPE, STATS_MESSAGE);
        event.fields.insert(FIELD_TOTAL_COUNT, snapshot.total);

        let delta = snapshot.total.saturating_sub(self.last_total);
        if elapsed >= 0.1 {
            let rate = (delta as f64 / elapsed).floor() as u64;
            event.fields.insert(FIELD_RATE, rate);
        } else {
            debug!(elapsed, "stats tick too close to the previous one, omitting rate");
        }
        event.fields.insert(FIELD_TOTAL_ELAPSED, total_elapsed);

        for (event_type, count) in snapshot.by_type {
            event.fields.insert(event_type, count);
        }
        event.annotate_with_metadata(&Default::default());

        self.last_tick = now;
        self.last_total = snapshot.total;
        event
    }
}

/// 초 단위 값을 소수점 첫째 자리에서 내림합니다.
fn round_down_tenth(d: Duration) -> f64 {
    (d.as_millis() / 100) as f64 / 10.0
}
