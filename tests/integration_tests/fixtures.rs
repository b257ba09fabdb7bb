//! Test fixtures for integration tests
//!
//! Provides sample pages, documents and listener profiles

/// Article page with navigation chrome around the readable body
pub const SAMPLE_ARTICLE_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Why the Tide Turns</title>
    <style>body { font-family: serif; }</style>
    <script>window.analytics = true;</script>
</head>
<body>
    <nav><a href="/">Home</a> | <a href="/science">Science</a></nav>
    <article>
        <h1>Why the Tide Turns</h1>
        <p>Twice a day the sea climbs the beach and slips away again.</p>
        <p>The pull of the moon raises a bulge of water that the Earth rotates through.</p>
        <p>Tide pools left behind host anemones, crabs and small fish.</p>
    </article>
    <footer>Copyright The Coastal Review</footer>
</body>
</html>
"#;

/// Page declaring a legacy charset in its content type
pub const LATIN1_ARTICLE_BYTES: &[u8] = b"<html><head><title>Caf\xe9 Science</title></head>\
<body><p>Le caf\xe9 du port sert les p\xeacheurs \xe0 l'aube.</p></body></html>";

/// Page with markup but no readable text
pub const EMPTY_ARTICLE_HTML: &str = r#"
<html><head><title>Nothing here</title><script>var x = 1;</script></head>
<body><nav>Menu</nav></body></html>
"#;

/// Plain-text upload
pub const SAMPLE_NOTES_TXT: &str = "Field notes on the spring tide.\n\n\
The water reached the third marker stone at noon.\n\
Two hermit crabs traded shells in the upper pool.";

/// Listener profiles as the CLI loads them from JSON
pub const SAMPLE_PROFILES_JSON: &str = r#"[
    {
        "id": "ana",
        "preferred_topics": ["oceans", "tides"],
        "preferred_genres": ["jazz"],
        "preferred_formats": ["news"],
        "nudges_enabled": true
    },
    {
        "id": "ben",
        "preferred_topics": ["history"],
        "nudges_enabled": false
    }
]"#;
