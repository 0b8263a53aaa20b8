use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use subforge_core::{CommentIdea, PostIdea};
use tracing::debug;

/// Text an idea contributes to its fingerprint.
pub trait NoveltySubject {
    fn title(&self) -> &str {
        ""
    }

    fn bullets(&self) -> &[String] {
        &[]
    }

    fn content(&self) -> &str {
        ""
    }
}

impl NoveltySubject for PostIdea {
    fn title(&self) -> &str {
        &self.title
    }

    fn bullets(&self) -> &[String] {
        &self.bullets
    }
}

impl NoveltySubject for CommentIdea {
    fn content(&self) -> &str {
        &self.content
    }
}

/// Lowercased, punctuation-free `title|bullets|content`. Empty when the idea has no text.
pub fn fingerprint<T: NoveltySubject + ?Sized>(idea: &T) -> String {
    let has_text = !idea.title().trim().is_empty()
        || idea.bullets().iter().any(|b| !b.trim().is_empty())
        || !idea.content().trim().is_empty();
    if !has_text {
        return String::new();
    }

    let mut parts = Vec::with_capacity(idea.bullets().len() + 2);
    parts.push(idea.title());
    parts.extend(idea.bullets().iter().map(String::as_str));
    parts.push(idea.content());
    let joined = parts.join("|").to_lowercase();

    let mut normalized = String::with_capacity(joined.len());
    let mut pending_space = false;
    for c in joined.chars() {
        if c == '|' {
            pending_space = false;
            normalized.push(c);
        } else if c.is_alphanumeric() {
            if pending_space && normalized.ends_with(|last: char| last.is_alphanumeric()) {
                normalized.push(' ');
            }
            pending_space = false;
            normalized.push(c);
        } else {
            pending_space = true;
        }
    }
    normalized
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoveltyPartition<T> {
    pub novel: Vec<T>,
    pub duplicates: Vec<T>,
}

/// Remembered fingerprints per community. Sets only grow for the life of the process.
#[derive(Debug, Default)]
pub struct NoveltyCache {
    seen: Mutex<HashMap<String, HashSet<String>>>,
}

impl NoveltyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits `ideas` in order into first occurrences and repeats of a remembered
    /// fingerprint or of an earlier idea in the same batch.
    pub fn filter_novel_ideas<T: NoveltySubject>(
        &self,
        subreddit: &str,
        ideas: Vec<T>,
    ) -> NoveltyPartition<T> {
        let seen = self.lock();
        let remembered = seen.get(&community_key(subreddit));
        let mut batch = HashSet::new();
        let mut partition = NoveltyPartition {
            novel: Vec::new(),
            duplicates: Vec::new(),
        };

        for idea in ideas {
            let print = fingerprint(&idea);
            if print.is_empty() {
                partition.novel.push(idea);
                continue;
            }

            let known = remembered.is_some_and(|set| set.contains(&print));
            if known || !batch.insert(print) {
                partition.duplicates.push(idea);
            } else {
                partition.novel.push(idea);
            }
        }

        debug!(
            "Novelty filter for r/{}: {} novel, {} duplicate",
            subreddit,
            partition.novel.len(),
            partition.duplicates.len()
        );
        partition
    }

    pub fn remember_ideas<T: NoveltySubject>(&self, subreddit: &str, ideas: &[T]) {
        let mut seen = self.lock();
        let set = seen.entry(community_key(subreddit)).or_default();
        for idea in ideas {
            let print = fingerprint(idea);
            if !print.is_empty() {
                set.insert(print);
            }
        }
    }

    pub fn remembered_count(&self, subreddit: &str) -> usize {
        self.lock()
            .get(&community_key(subreddit))
            .map_or(0, HashSet::len)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashSet<String>>> {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn community_key(subreddit: &str) -> String {
    subreddit.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn post_idea(title: &str, bullets: &[&str]) -> PostIdea {
        PostIdea {
            id: Uuid::new_v4(),
            title: title.to_string(),
            bullets: bullets.iter().map(|b| b.to_string()).collect(),
            inspiration: String::new(),
            format: "story".to_string(),
            novelty_note: String::new(),
            novelty_score: None,
        }
    }

    #[test]
    fn test_fingerprint_normalizes_case_and_punctuation() {
        let a = post_idea("I quit my job!", &["Hook: why?", "Payoff"]);
        let b = post_idea("i quit   my job", &["hook why", "payoff."]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a), "i quit my job|hook why|payoff|");
    }

    #[test]
    fn test_fingerprint_of_empty_idea_is_empty() {
        assert_eq!(fingerprint(&post_idea("  ", &["", " "])), "");
    }

    #[test]
    fn test_remembered_idea_becomes_duplicate() {
        let cache = NoveltyCache::new();
        let idea = post_idea("Unpopular opinion about borrowck", &["a", "b", "c"]);

        let first = cache.filter_novel_ideas("rust", vec![idea.clone()]);
        assert_eq!(first.novel.len(), 1);

        cache.remember_ideas("rust", &[idea.clone()]);
        let second = cache.filter_novel_ideas("Rust", vec![idea]);
        assert!(second.novel.is_empty());
        assert_eq!(second.duplicates.len(), 1);
    }

    #[test]
    fn test_repeat_within_batch_is_duplicate() {
        let cache = NoveltyCache::new();
        let ideas = vec![
            post_idea("Same", &["x"]),
            post_idea("Other", &["y"]),
            post_idea("same", &["X"]),
        ];

        let partition = cache.filter_novel_ideas("rust", ideas);
        let titles: Vec<_> = partition.novel.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Same", "Other"]);
        assert_eq!(partition.duplicates[0].title, "same");
    }

    #[test]
    fn test_empty_ideas_are_always_novel() {
        let cache = NoveltyCache::new();
        let empty = post_idea("", &[]);
        cache.remember_ideas("rust", &[empty.clone()]);
        assert_eq!(cache.remembered_count("rust"), 0);

        let partition = cache.filter_novel_ideas("rust", vec![empty.clone(), empty]);
        assert_eq!(partition.novel.len(), 2);
        assert!(partition.duplicates.is_empty());
    }

    #[test]
    fn test_communities_are_independent() {
        let cache = NoveltyCache::new();
        let idea = CommentIdea {
            id: Uuid::new_v4(),
            content: "Great point about lifetimes".to_string(),
            reasoning: String::new(),
        };
        cache.remember_ideas("rust", &[idea.clone()]);

        assert_eq!(cache.filter_novel_ideas("golang", vec![idea.clone()]).novel.len(), 1);
        assert_eq!(cache.filter_novel_ideas("RUST", vec![idea]).duplicates.len(), 1);
    }
}
