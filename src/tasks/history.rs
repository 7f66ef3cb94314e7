use tokio::sync::RwLock;

use crate::api::MigrationApi;
use crate::error::Result;
use crate::tasks::store::TaskStore;

/// Fetch history page `page` (zero-based) into the store. The loading flag
/// is cleared whether or not the request succeeds.
pub async fn load_page<A>(api: &A, store: &RwLock<TaskStore>, page: u32) -> Result<()>
where
    A: MigrationApi + ?Sized,
{
    let page_size = {
        let mut store = store.write().await;
        store.set_loading(true);
        store.pagination().page_size
    };

    let result = api
        .list_tasks(page_size, page.saturating_mul(page_size))
        .await;

    let mut store = store.write().await;
    store.set_loading(false);
    let result = result?;
    log::debug!(
        "Loaded history page {page}: {} of {} tasks",
        result.tasks.len(),
        result.total
    );
    store.set_page(page, result);
    Ok(())
}
