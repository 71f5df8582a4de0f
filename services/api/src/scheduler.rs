use campus_admin::billing::{BillingService, BillingStore};
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Runs the daily transition for every entity kind on a fixed period.
///
/// The first tick fires immediately. Runs execute on the blocking pool since
/// storage access is synchronous; a failed kind is logged and retried on the
/// next tick only.
pub(crate) fn spawn<S>(service: Arc<BillingService<S>>, period: Duration) -> JoinHandle<()>
where
    S: BillingStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_secs = period.as_secs(), "transition scheduler started");

        loop {
            ticker.tick().await;
            let service = service.clone();
            let today = Local::now().date_naive();

            match tokio::task::spawn_blocking(move || service.run_daily_transitions(today)).await {
                Ok(results) => {
                    let failed = results.iter().filter(|result| result.is_err()).count();
                    if failed > 0 {
                        error!(%today, failed, "scheduled transition finished with failures");
                    }
                }
                Err(err) => error!(%today, error = %err, "scheduled transition task panicked"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_admin::billing::{
        Discount, DiscountAmount, DiscountStatus, Locale, Window, WindowedRepository,
    };
    use campus_admin::storage::MemoryStore;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn scheduler_activates_due_discounts() {
        let store = Arc::new(MemoryStore::new());
        let mut discount = Discount::propose(
            "Pronto pago",
            DiscountAmount::Porcentaje(dec!(5)),
            Window::open_ended(NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid date")),
        );
        discount.approve().expect("approves");
        WindowedRepository::<Discount>::insert(&*store, discount.clone()).expect("insert");

        let service = Arc::new(BillingService::new(store.clone(), Locale::Es).expect("builds"));
        let handle = spawn(service, Duration::from_millis(20));

        let mut status = DiscountStatus::Approved;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = WindowedRepository::<Discount>::fetch(&*store, &discount.id)
                .expect("fetch")
                .expect("present")
                .status;
            if status == DiscountStatus::Active {
                break;
            }
        }
        handle.abort();

        assert_eq!(status, DiscountStatus::Active);
    }
}
