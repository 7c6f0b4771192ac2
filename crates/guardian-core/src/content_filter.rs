use guardian_storage::{CategoryRule, ClockTime, ContentCategory, TimeWindow};

const ENTERTAINMENT_KEYWORDS: &[&str] = &[
    "123movies",
    "putlocker",
    "soap2day",
    "gomovies",
    "fmovies",
    "fullmoviess",
    "moviesto",
    "watchmovies",
    "freemovies",
    "hdmovies",
    "streamingmovies",
    "moviehub",
    "filmhub",
    "cinemahub",
    "movie4k",
    "moviehd",
    "movie",
    "film",
    "cinema",
    "torrent",
    "netflix",
    "hulu",
    "disneyplus",
    "crunchyroll",
];

const ADULT_KEYWORDS: &[&str] = &[
    "porn",
    "pornhub",
    "xxx",
    "xvideos",
    "xhamster",
    "redtube",
    "youporn",
    "tube8",
    "nsfw",
    "x-rated",
    "adultfriendfinder",
    "ashleymadison",
    "hookup",
    "nude",
    "naked",
    "erotic",
    ".xxx",
    ".porn",
    ".sex",
    ".adult",
];

/// A category detected for a URL, with the keyword that matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMatch {
    pub category: ContentCategory,
    pub keyword: &'static str,
}

/// Outcome of the time-gated category table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryDecision {
    /// Category never exempted, or outside its window
    Block(ContentCategory),
    /// Inside the category's allowed window
    Allow(ContentCategory, TimeWindow),
}

const fn keywords_for(category: ContentCategory) -> &'static [&'static str] {
    match category {
        ContentCategory::Entertainment => ENTERTAINMENT_KEYWORDS,
        ContentCategory::Adult => ADULT_KEYWORDS,
    }
}

/// Case-insensitive keyword detection over the URL and hostname
#[must_use]
pub fn detect(category: ContentCategory, url: &str, hostname: &str) -> Option<CategoryMatch> {
    let url = url.to_lowercase();
    let hostname = hostname.to_lowercase();
    keywords_for(category)
        .iter()
        .find(|k| url.contains(*k) || hostname.contains(*k))
        .map(|keyword| CategoryMatch { category, keyword })
}

/// Apply the category table in order; first detected category decides.
///
/// `time` is the current wall-clock time in the configured zone. Rules with a
/// window need it; when it is unknown those rules are skipped.
#[must_use]
pub fn evaluate_categories(
    rules: &[CategoryRule],
    url: &str,
    hostname: &str,
    time: Option<ClockTime>,
) -> Option<CategoryDecision> {
    for rule in rules {
        let Some(found) = detect(rule.category, url, hostname) else {
            continue;
        };
        log::debug!("{hostname} detected as {} ('{}')", found.category, found.keyword);
        match (rule.window, time) {
            (None, _) => return Some(CategoryDecision::Block(rule.category)),
            (Some(window), Some(now)) if window.contains(now) => {
                return Some(CategoryDecision::Allow(rule.category, window));
            }
            (Some(_), Some(_)) => return Some(CategoryDecision::Block(rule.category)),
            (Some(_), None) => {}
        }
    }
    None
}
