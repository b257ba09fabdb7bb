//! Feed ranking integration tests
//!
//! Pages are assembled from completed content, ready shows and nudges with
//! jitter disabled, so ordering follows the weights alone.

use castwave::app::Services;
use castwave::feed::FeedItem;
use castwave::models::{Content, KnowledgeNudge, RadioShow, ShowStatus, ShowType, UserProfile};

use crate::common::{self, insert_completed, scripted_provider};

async fn ready_show(
    services: &Services,
    owner: Option<&str>,
    show_type: ShowType,
    source: &Content,
) -> RadioShow {
    let mut show = RadioShow::generating(
        owner.map(str::to_string),
        format!("{show_type} show"),
        show_type,
        vec![source.id],
    );
    show.status = ShowStatus::Ready;
    services.repos.shows.insert_show(&show).await.unwrap();
    show
}

fn kinds(page: &castwave::feed::FeedPage) -> Vec<&'static str> {
    page.entries.iter().map(|e| e.item.kind()).collect()
}

// ============================================================================
// Composition
// ============================================================================

#[tokio::test]
async fn test_fresh_listener_gets_a_mixed_feed() {
    let services = common::test_services(scripted_provider("mock", 150));
    let tides = insert_completed(&services, "ana", "Spring tides reach the dunes", &["tides"]).await;
    insert_completed(&services, "ana", "Kelp forests grow fast", &["kelp"]).await;
    insert_completed(&services, "ben", "Roman roads still stand", &["history"]).await;
    ready_show(&services, None, ShowType::News, &tides).await;
    services
        .repos
        .nudges
        .insert_nudge(&KnowledgeNudge::new("ana", common::FACT_REPLY, "science", tides.id))
        .await
        .unwrap();

    let page = services.feed.build_page("ana", 10, 0).await.unwrap();
    assert_eq!(page.total, 5);
    assert!(!page.has_more());
    // One of each kind before any kind repeats
    assert_eq!(&kinds(&page)[..3], &["content", "show", "nudge"]);
    assert_eq!(kinds(&page).iter().filter(|k| **k == "content").count(), 3);
}

#[tokio::test]
async fn test_listener_without_profile_or_content_still_gets_a_feed() {
    let services = common::test_services(scripted_provider("mock", 150));
    insert_completed(&services, "ana", "Storm petrels skim the waves", &["birds"]).await;

    let page = services.feed.build_page("newcomer", 10, 0).await.unwrap();
    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.user_id, "newcomer");
}

#[tokio::test]
async fn test_other_listeners_shows_are_hidden() {
    let services = common::test_services(scripted_provider("mock", 150));
    let source = insert_completed(&services, "ben", "Viking boats crossed the sea", &["history"]).await;
    ready_show(&services, Some("ben"), ShowType::Talk, &source).await;
    let global = ready_show(&services, None, ShowType::News, &source).await;

    let generating = RadioShow::generating(None, "Not yet", ShowType::News, vec![source.id]);
    services.repos.shows.insert_show(&generating).await.unwrap();

    let page = services.feed.build_page("ana", 10, 0).await.unwrap();
    let shows: Vec<_> = page
        .entries
        .iter()
        .filter_map(|e| match &e.item {
            FeedItem::Show(show) => Some(show.id),
            _ => None,
        })
        .collect();
    assert_eq!(shows, vec![global.id]);
}

#[tokio::test]
async fn test_duplicate_text_appears_once() {
    let services = common::test_services(scripted_provider("mock", 150));
    insert_completed(&services, "ana", "The same article pasted twice", &["tides"]).await;
    insert_completed(&services, "ben", "The same article pasted twice", &["tides"]).await;

    let page = services.feed.build_page("ana", 10, 0).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.entries.len(), 1);
}

// ============================================================================
// Ranking
// ============================================================================

#[tokio::test]
async fn test_liked_topics_rank_first() {
    let services = common::test_services(scripted_provider("mock", 150));
    let history = insert_completed(&services, "ben", "Aqueducts carried water to Rome", &["history"]).await;
    insert_completed(&services, "ben", "Sourdough starters need feeding", &["cooking"]).await;
    insert_completed(&services, "ben", "Comets return on long orbits", &["astronomy"]).await;
    let more_history =
        insert_completed(&services, "ben", "Castles were built on hills", &["history"]).await;

    let mut cara = UserProfile::new("cara");
    cara.liked_content_ids.insert(history.id);
    services.repos.users.upsert_user(&cara).await.unwrap();

    let page = services.feed.build_page("cara", 10, 0).await.unwrap();
    let top: Vec<_> = page.entries[..2].iter().map(|e| e.item.id()).collect();
    assert!(top.contains(&history.id));
    assert!(top.contains(&more_history.id));
    assert!(page.entries[0].score > page.entries[2].score);
}

#[tokio::test]
async fn test_preferred_format_show_outranks_other_shows() {
    let services = common::test_services(scripted_provider("mock", 150));
    let source = insert_completed(&services, "ben", "Glaciers carve valleys", &["geology"]).await;
    ready_show(&services, None, ShowType::News, &source).await;
    let talk = ready_show(&services, None, ShowType::Talk, &source).await;

    let mut ana = UserProfile::new("ana");
    ana.preferred_formats.insert(ShowType::Talk);
    services.repos.users.upsert_user(&ana).await.unwrap();

    let page = services.feed.build_page("ana", 10, 0).await.unwrap();
    let first_show = page
        .entries
        .iter()
        .find_map(|e| match &e.item {
            FeedItem::Show(show) => Some(show.id),
            _ => None,
        })
        .unwrap();
    assert_eq!(first_show, talk.id);
}

#[tokio::test]
async fn test_own_content_outranks_others() {
    let services = common::test_services(scripted_provider("mock", 150));
    let own = insert_completed(&services, "ana", "My notes on sand dunes", &["dunes"]).await;
    insert_completed(&services, "ben", "Somebody else's notes on dunes", &["dunes"]).await;

    let page = services.feed.build_page("ana", 10, 0).await.unwrap();
    assert_eq!(page.entries[0].item.id(), own.id);
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_pages_do_not_overlap() {
    let services = common::test_services(scripted_provider("mock", 150));
    for (i, topic) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
        insert_completed(&services, "ana", &format!("Item number {i} about {topic}"), &[topic]).await;
    }

    let first = services.feed.build_page("ana", 2, 0).await.unwrap();
    let second = services.feed.build_page("ana", 2, 2).await.unwrap();
    let last = services.feed.build_page("ana", 2, 4).await.unwrap();

    assert!(first.has_more());
    assert!(second.has_more());
    assert!(!last.has_more());
    assert_eq!(last.entries.len(), 1);

    let mut ids: Vec<_> = [&first, &second, &last]
        .iter()
        .flat_map(|p| p.entries.iter().map(|e| e.item.id()))
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 5);

    let beyond = services.feed.build_page("ana", 2, 10).await.unwrap();
    assert!(beyond.entries.is_empty());
    assert!(!beyond.has_more());
}
