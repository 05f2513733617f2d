//! Session store laws: save/get round-trips, bidirectional parent/child
//! consistency, and ancestry walks, against both providers.

use std::sync::Arc;

use orcha_foundation::store::{FileSessionStore, InMemorySessionStore};
use orcha_kernel::session::{
    Session, SessionEvent, SessionRun, SessionStore, ancestors, descendants, spawn_child,
};

async fn assert_store_laws(store: Arc<dyn SessionStore>) {
    // Round trip: equal id, events, runs, hierarchy.
    let mut root = Session::new();
    root.add_event(SessionEvent::user_message("root question"));
    let mut run = SessionRun::new();
    run.mark_running();
    run.mark_completed();
    root.runs.push(run);
    store.save(&root).await.unwrap();

    let loaded = store.get(&root.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, root.id);
    assert_eq!(loaded.events.len(), 1);
    assert_eq!(loaded.events[0].id, root.events[0].id);
    assert_eq!(loaded.runs.len(), 1);
    assert_eq!(loaded.runs[0].status, root.runs[0].status);

    // Hierarchy: for every session S with parent P, P.child_ids contains
    // S.id, and every id in P.child_ids resolves back to P.
    let child = spawn_child(store.as_ref(), &root.id).await.unwrap();
    let grandchild = spawn_child(store.as_ref(), &child.id).await.unwrap();

    let parent = store.get(&root.id).await.unwrap().unwrap();
    assert!(parent.child_ids.contains(&child.id));
    for id in &parent.child_ids {
        let resolved = store.get(id).await.unwrap().unwrap();
        assert_eq!(resolved.parent_id.as_deref(), Some(parent.id.as_str()));
    }

    // Ancestry walks resolve through the store, nearest first.
    let loaded_grandchild = store.get(&grandchild.id).await.unwrap().unwrap();
    let lineage = ancestors(store.as_ref(), &loaded_grandchild).await.unwrap();
    assert_eq!(lineage.len(), 2);
    assert_eq!(lineage[0].id, child.id);
    assert_eq!(lineage[1].id, root.id);

    let tree = descendants(store.as_ref(), &parent).await.unwrap();
    assert_eq!(tree.len(), 2);

    // Delete is explicit and idempotent.
    store.delete(&grandchild.id).await.unwrap();
    assert!(store.get(&grandchild.id).await.unwrap().is_none());
    store.delete(&grandchild.id).await.unwrap();
}

#[tokio::test]
async fn memory_store_laws() {
    assert_store_laws(InMemorySessionStore::shared()).await;
}

#[tokio::test]
async fn file_store_laws() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileSessionStore::new(dir.path()).await.unwrap());
    assert_store_laws(store).await;
}

#[tokio::test]
async fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let (root_id, child_id) = {
        let store = FileSessionStore::new(dir.path()).await.unwrap();
        let root = Session::new();
        store.save(&root).await.unwrap();
        let child = spawn_child(&store, &root.id).await.unwrap();
        (root.id.clone(), child.id.clone())
    };

    let store = FileSessionStore::new(dir.path()).await.unwrap();
    let parent = store.get(&root_id).await.unwrap().unwrap();
    assert!(parent.child_ids.contains(&child_id));
    let ids = store.list(None).await.unwrap();
    assert_eq!(ids.len(), 2);
}
