use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use subforge_core::{EngagementPatterns, RedditPost};

pub const MAX_TOPICS: usize = 20;
pub const RECENT_WINDOW_DAYS: i64 = 14;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "is", "was", "are",
    "be", "been", "being", "have", "has", "had", "this", "that", "with", "from", "what", "your",
    "about", "just", "they", "their", "there", "when", "will", "would", "does", "into",
];

/// Unique title words longer than three characters, in first-seen order.
pub fn extract_topics(posts: &[RedditPost]) -> Vec<String> {
    let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    let mut seen = HashSet::new();
    let mut topics = Vec::new();

    for post in posts {
        for word in post.title.to_lowercase().split_whitespace() {
            if word.chars().count() <= 3 || stop_words.contains(word) {
                continue;
            }
            if seen.insert(word.to_string()) {
                topics.push(word.to_string());
                if topics.len() == MAX_TOPICS {
                    return topics;
                }
            }
        }
    }

    topics
}

pub fn analyze_engagement(posts: &[RedditPost]) -> EngagementPatterns {
    if posts.is_empty() {
        return EngagementPatterns {
            avg_upvotes: 0.0,
            avg_comments: 0.0,
        };
    }

    let count = posts.len() as f64;
    let total_upvotes: i64 = posts.iter().map(|p| p.upvotes).sum();
    let total_comments: u64 = posts.iter().map(|p| p.comments).sum();

    EngagementPatterns {
        avg_upvotes: (total_upvotes as f64 / count).round(),
        avg_comments: (total_comments as f64 / count).round(),
    }
}

/// Keeps posts created within `days` of `now`, preserving rank order, up to `limit`.
pub fn filter_recent_posts(
    posts: Vec<RedditPost>,
    now: DateTime<Utc>,
    days: i64,
    limit: usize,
) -> Vec<RedditPost> {
    let cutoff = now - Duration::days(days);
    posts
        .into_iter()
        .filter(|post| post.created_at >= cutoff)
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(title: &str, upvotes: i64, comments: u64, age_days: i64) -> RedditPost {
        RedditPost {
            id: title.to_lowercase().replace(' ', "_"),
            title: title.to_string(),
            content: String::new(),
            author: "author".to_string(),
            subreddit: "rust".to_string(),
            upvotes,
            downvotes: 0,
            comments,
            created_at: Utc::now() - Duration::days(age_days),
            url: String::new(),
            score: upvotes,
        }
    }

    #[test]
    fn test_extract_topics_skips_short_and_stop_words() {
        let posts = vec![
            post("Borrow checker tips for the new year", 10, 1, 0),
            post("Async traits have finally landed", 10, 1, 0),
            post("borrow checker again", 10, 1, 0),
        ];

        let topics = extract_topics(&posts);
        assert_eq!(
            topics,
            vec!["borrow", "checker", "tips", "year", "async", "traits", "finally", "landed", "again"]
        );
    }

    #[test]
    fn test_extract_topics_caps_at_twenty() {
        let title = (0..30)
            .map(|i| format!("word{:02}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let topics = extract_topics(&[post(&title, 1, 1, 0)]);
        assert_eq!(topics.len(), MAX_TOPICS);
        assert_eq!(topics[0], "word00");
    }

    #[test]
    fn test_engagement_of_empty_set_is_zero() {
        let engagement = analyze_engagement(&[]);
        assert_eq!(engagement.avg_upvotes, 0.0);
        assert_eq!(engagement.avg_comments, 0.0);
    }

    #[test]
    fn test_engagement_means() {
        let engagement = analyze_engagement(&[post("one", 100, 10, 0), post("two", 51, 5, 0)]);
        assert_eq!(engagement.avg_upvotes, 76.0);
        assert_eq!(engagement.avg_comments, 8.0);
    }

    #[test]
    fn test_filter_recent_posts_drops_old_and_truncates() {
        let posts = vec![
            post("fresh one", 1, 0, 1),
            post("stale", 1, 0, 20),
            post("fresh two", 1, 0, 13),
            post("fresh three", 1, 0, 2),
        ];

        let recent = filter_recent_posts(posts, Utc::now(), RECENT_WINDOW_DAYS, 2);
        let titles: Vec<_> = recent.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["fresh one", "fresh two"]);
    }
}
