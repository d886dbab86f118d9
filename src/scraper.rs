use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::card;
use crate::contact::{self, MissingPhonePolicy, PhoneKind};
use crate::error::{CardError, ScrapeError};
use crate::feed::{FeedPaginator, FeedSurface, PaginationSettings, StopReason};
use crate::lead::{LeadRecord, LeadSink, UsageMeter};

/// What a scan needs besides the surface and the sink.
pub struct ScanPlan {
    pub query: String,
    pub target: usize,
    pub missing_phone: MissingPhonePolicy,
    pub pagination: PaginationSettings,
}

/// Totals reported after a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub query: String,
    pub target: usize,
    pub collected: usize,
    /// Scroll gestures spent growing the feed.
    pub rounds: usize,
    pub emitted: usize,
    pub skipped: usize,
    pub whatsapp: usize,
    pub stop: StopReason,
}

/// Page the feed, then turn every collected card into a ranked lead.
///
/// A card that cannot be read is skipped with a warning. Ranks count only
/// emitted records, so they stay gapless.
pub async fn harvest<S, K, M>(
    surface: &S,
    plan: &ScanPlan,
    sink: &mut K,
    meter: &mut M,
) -> Result<ScanSummary, ScrapeError>
where
    S: FeedSurface,
    K: LeadSink + ?Sized,
    M: UsageMeter + ?Sized,
{
    let page = FeedPaginator::new(surface, plan.pagination.clone())
        .collect(plan.target)
        .await?;
    info!("Collected {} cards ({})", page.items.len(), page.stop);

    let pb = ProgressBar::new(page.items.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} cards")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let mut rank = 0u32;
    let mut skipped = 0usize;
    let mut whatsapp = 0usize;

    for (i, item) in page.items.iter().enumerate() {
        pb.inc(1);
        let record = match compose(surface, item, rank + 1, plan).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping card {}: {}", i + 1, e);
                skipped += 1;
                continue;
            }
        };
        rank = record.rank;

        if record.kind == PhoneKind::MobileWhatsApp {
            whatsapp += 1;
            meter.whatsapp_lead(&record);
        }
        if let Err(e) = sink.emit(record) {
            pb.finish_and_clear();
            return Err(ScrapeError::Sink(e));
        }
    }

    let flushed = sink.flush();
    pb.finish_and_clear();
    flushed.map_err(ScrapeError::Sink)?;

    let summary = ScanSummary {
        query: plan.query.clone(),
        target: plan.target,
        collected: page.items.len(),
        rounds: page.rounds,
        emitted: rank as usize,
        skipped,
        whatsapp,
        stop: page.stop,
    };
    info!(
        "Emitted {} leads ({} WhatsApp, {} skipped) after {} scrolls",
        summary.emitted, summary.whatsapp, summary.skipped, summary.rounds
    );
    Ok(summary)
}

async fn compose<S: FeedSurface>(
    surface: &S,
    item: &S::Item,
    rank: u32,
    plan: &ScanPlan,
) -> Result<LeadRecord, CardError> {
    let text = surface.card_text(item).await?;
    let parsed = card::parse_card(&text);
    let phone = contact::classify(parsed.raw_phone(), plan.missing_phone);

    Ok(LeadRecord {
        raw_phone: parsed.raw_phone().map(str::to_string),
        name: parsed.name,
        cleaned_phone: phone.cleaned_digits,
        kind: phone.kind,
        messaging_link: phone.messaging_link,
        rank,
        source_query: plan.query.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::testing::{MissingFeed, ScriptedFeed};
    use crate::lead::testing::{RejectingSink, VecSink};
    use crate::lead::EventCounter;

    fn plan(target: usize) -> ScanPlan {
        ScanPlan {
            query: "Dentistas em Praia Grande, SP".to_string(),
            target,
            missing_phone: MissingPhonePolicy::default(),
            pagination: PaginationSettings {
                settle_ms: 0,
                ..PaginationSettings::default()
            },
        }
    }

    #[tokio::test]
    async fn ranks_are_gapless_around_skipped_cards() {
        let feed = ScriptedFeed::new(6, &[6]).with_broken_cards(&[2, 5]);
        let mut sink = VecSink::default();
        let mut meter = EventCounter::default();

        let summary = harvest(&feed, &plan(10), &mut sink, &mut meter)
            .await
            .unwrap();

        assert_eq!(summary.collected, 10);
        assert_eq!(summary.rounds, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.emitted, 8);
        let ranks: Vec<u32> = sink.records.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, (1..=8).collect::<Vec<u32>>());
        assert!(sink.records.iter().all(|r| r.name != "Dentista 2" && r.name != "Dentista 5"));
    }

    #[tokio::test]
    async fn records_carry_classification() {
        let feed = ScriptedFeed::new(3, &[]);
        let mut sink = VecSink::default();
        let mut meter = EventCounter::default();

        let summary = harvest(&feed, &plan(3), &mut sink, &mut meter).await.unwrap();

        let first = &sink.records[0];
        assert_eq!(first.name, "Dentista 1");
        assert_eq!(first.raw_phone.as_deref(), Some("(13) 90001-0001"));
        assert_eq!(first.cleaned_phone, "13900010001");
        assert_eq!(first.kind, PhoneKind::MobileWhatsApp);
        assert_eq!(first.messaging_link, "https://wa.me/5513900010001");
        assert_eq!(first.source_query, "Dentistas em Praia Grande, SP");

        assert_eq!(summary.whatsapp, 3);
        assert_eq!(meter.whatsapp, 3);
        assert_eq!(summary.stop, StopReason::TargetReached);
    }

    #[tokio::test]
    async fn exhausted_feed_emits_what_exists() {
        let feed = ScriptedFeed::new(2, &[1]).with_end_marker_after(1);
        let mut sink = VecSink::default();
        let mut meter = EventCounter::default();

        let summary = harvest(&feed, &plan(10), &mut sink, &mut meter).await.unwrap();
        assert_eq!(summary.stop, StopReason::EndOfList);
        assert_eq!(sink.records.len(), 3);
    }

    #[tokio::test]
    async fn zero_target_emits_nothing() {
        let feed = ScriptedFeed::new(5, &[5]);
        let mut sink = VecSink::default();
        let mut meter = EventCounter::default();

        let summary = harvest(&feed, &plan(0), &mut sink, &mut meter).await.unwrap();
        assert_eq!(summary.emitted, 0);
        assert!(sink.records.is_empty());
        assert_eq!(feed.scrolls(), 0);
    }

    #[tokio::test]
    async fn missing_feed_aborts_before_emitting() {
        let mut sink = VecSink::default();
        let mut meter = EventCounter::default();

        let result = harvest(&MissingFeed, &plan(10), &mut sink, &mut meter).await;
        assert!(matches!(result, Err(ScrapeError::FeedNotFound { .. })));
        assert!(sink.records.is_empty());
    }

    #[tokio::test]
    async fn sink_failure_stops_the_scan() {
        let feed = ScriptedFeed::new(5, &[]);
        let mut sink = RejectingSink::after(2);
        let mut meter = EventCounter::default();

        let result = harvest(&feed, &plan(5), &mut sink, &mut meter).await;
        assert!(matches!(result, Err(ScrapeError::Sink(_))));
        assert_eq!(sink.records.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2]);
        // the rejected third card was read; the last two never were
        assert_eq!(feed.reads(), 3);
    }
}
