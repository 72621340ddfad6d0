use std::time::Duration;

use aula_cache::{QueryOptions, QueryState};
use aula_core::{keys, StatisticsReport};

use crate::context::AppContext;

pub const STATISTICS_STALE_TIME: Duration = Duration::from_secs(15 * 60);

impl AppContext {
    pub async fn general_statistics(&self) -> QueryState<StatisticsReport> {
        let options =
            QueryOptions::new(keys::general_statistics()).with_stale_time(STATISTICS_STALE_TIME);
        self.query(options, |api| async move { api.general_statistics().await })
            .await
    }

    pub async fn subject_statistics(
        &self,
        subject_code: &str,
        plan_code: Option<&str>,
    ) -> QueryState<StatisticsReport> {
        let code = subject_code.to_string();
        let plan = plan_code.map(str::to_string);
        let options = QueryOptions::new(keys::subject_statistics(subject_code, plan_code))
            .with_stale_time(STATISTICS_STALE_TIME)
            .enabled(!subject_code.trim().is_empty());
        self.query(options, move |api| {
            let code = code.clone();
            let plan = plan.clone();
            async move { api.subject_statistics(&code, plan.as_deref()).await }
        })
        .await
    }

    /// Admin-wide statistics. Disabled for anyone but an admin.
    pub async fn admin_statistics(&self) -> QueryState<StatisticsReport> {
        let is_admin = self.session().is_some_and(|s| s.is_admin());
        let options = QueryOptions::new(keys::admin_statistics())
            .with_stale_time(STATISTICS_STALE_TIME)
            .enabled(is_admin);
        self.query(options, |api| async move { api.admin_statistics().await })
            .await
    }
}
