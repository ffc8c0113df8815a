//! Maps raw actor references to stable identities.
//!
//! Strong identities come from a canonical profile URL. Without a URL the
//! identity falls back to a weak key over the normalized name and title.
//! Resolution never fails; it only loses confidence.

use serde::Serialize;
use url::Url;

use super::parser::ParsedPost;
use crate::models::actor::{ActorId, ActorKind, Confidence, RawActor};
use crate::models::post::PostKey;
use crate::utils::hash::stable_id;
use crate::utils::text::normalize_key;

/// Base for profile links scraped as relative paths (`/in/jane-doe`).
const PROFILE_BASE: &str = "https://www.linkedin.com";

/// Name given to the synthetic author of a post without an author block.
pub const UNKNOWN_ACTOR_NAME: &str = "Unknown Actor";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedActor {
    pub id: ActorId,
    pub kind: ActorKind,
    pub confidence: Confidence,
    pub canonical_url: Option<String>,
    pub display_name: String,
    pub title: Option<String>,
    pub image_url: Option<String>,
}

/// A parsed post with every participant resolved.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedPost {
    pub parsed: ParsedPost,
    pub author: ResolvedActor,
    /// One entry per liker, in document order.
    pub likers: Vec<ResolvedActor>,
    /// Indexed like `parsed.comments.nodes`.
    pub commenters: Vec<ResolvedActor>,
}

impl ResolvedPost {
    /// Every actor reference in document order: author, likers, commenters.
    /// The same identity may appear more than once, possibly under another name.
    pub fn occurrences(&self) -> impl Iterator<Item = &ResolvedActor> {
        std::iter::once(&self.author)
            .chain(&self.likers)
            .chain(&self.commenters)
    }

    /// Every distinct actor in the post, sorted by id.
    pub fn distinct_actors(&self) -> Vec<&ResolvedActor> {
        let mut actors: Vec<&ResolvedActor> = self.occurrences().collect();
        actors.sort_by(|a, b| a.id.cmp(&b.id));
        actors.dedup_by(|a, b| a.id == b.id);
        actors
    }
}

/// Canonical form of a profile URL, or `None` if it cannot be parsed.
///
/// Forces https, lowercases the host, drops query, fragment and trailing
/// slash. Profile pages (`/in/`, `/company/`, `/school/`, `/showcase/`) are cut
/// to their first two segments so sub-pages resolve to the same profile. The
/// first segment stays part of the key, which keeps companies and people apart.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parsed = if raw.starts_with('/') {
        Url::parse(PROFILE_BASE).ok()?.join(raw).ok()?
    } else {
        Url::parse(raw).ok()?
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_lowercase();

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let kept = match segments.first().copied() {
        Some("in" | "company" | "school" | "showcase") => &segments[..segments.len().min(2)],
        _ => &segments[..],
    };

    let mut canonical = format!("https://{host}");
    for segment in kept {
        canonical.push('/');
        canonical.push_str(segment);
    }
    Some(canonical)
}

fn kind_of(canonical_url: &str) -> ActorKind {
    let path = canonical_url
        .strip_prefix("https://")
        .and_then(|rest| rest.split_once('/'))
        .map(|(_, path)| path)
        .unwrap_or_default();

    match path.split('/').next() {
        Some("in") => ActorKind::Person,
        Some("company" | "school" | "showcase") => ActorKind::Organization,
        _ => ActorKind::Other,
    }
}

/// Resolve one raw actor reference.
pub fn resolve_actor(raw: &RawActor) -> ResolvedActor {
    if let Some(canonical) = raw.profile_url.as_deref().and_then(canonicalize_url) {
        return ResolvedActor {
            id: ActorId(stable_id("url", &[&canonical])),
            kind: kind_of(&canonical),
            confidence: Confidence::Strong,
            display_name: display_name(raw, &canonical),
            canonical_url: Some(canonical),
            title: raw.title.clone(),
            image_url: raw.image_url.clone(),
        };
    }

    if let Some(url) = &raw.profile_url {
        tracing::debug!("Unparseable profile URL {:?}, falling back to weak key", url);
    }

    let name_key = normalize_key(&raw.name);
    let title_key = raw.title.as_deref().map(normalize_key).unwrap_or_default();
    let id = ActorId(stable_id("weak", &[&name_key, &title_key]));

    tracing::debug!(
        "LowConfidenceResolution: actor {:?} resolved by name and title to {}",
        raw.name,
        id
    );

    ResolvedActor {
        id,
        kind: ActorKind::Unknown,
        confidence: Confidence::Weak,
        canonical_url: None,
        display_name: raw.name.clone(),
        title: raw.title.clone(),
        image_url: raw.image_url.clone(),
    }
}

fn display_name(raw: &RawActor, canonical: &str) -> String {
    if raw.name.is_empty() {
        canonical.to_string()
    } else {
        raw.name.clone()
    }
}

/// Synthetic author for a post whose document carries no author block.
/// Scoped to the post, so it never merges with anyone else.
pub fn unknown_actor(key: &PostKey) -> ResolvedActor {
    unknown_with_id(ActorId(stable_id(
        "unknown",
        &[&key.keyword, &key.post_number.to_string()],
    )))
}

/// Synthetic author for a comment without an author block. Scoped to the
/// comment's arena index, so anonymous commenters stay apart from each other
/// and from an unknown post author.
pub fn unknown_commenter(key: &PostKey, index: usize) -> ResolvedActor {
    unknown_with_id(ActorId(stable_id(
        "unknown-commenter",
        &[&key.keyword, &key.post_number.to_string(), &index.to_string()],
    )))
}

fn unknown_with_id(id: ActorId) -> ResolvedActor {
    ResolvedActor {
        id,
        kind: ActorKind::Unknown,
        confidence: Confidence::Weak,
        canonical_url: None,
        display_name: UNKNOWN_ACTOR_NAME.to_string(),
        title: None,
        image_url: None,
    }
}

/// Resolve the author, likers and commenters of a parsed post.
pub fn resolve_post(parsed: ParsedPost) -> ResolvedPost {
    let author = match &parsed.author {
        Some(raw) => resolve_actor(raw),
        None => unknown_actor(&parsed.key),
    };

    let likers = parsed.likers.iter().map(resolve_actor).collect();

    let commenters = parsed
        .comments
        .nodes
        .iter()
        .enumerate()
        .map(|(index, node)| match &node.item.author {
            Some(raw) => resolve_actor(raw),
            None => unknown_commenter(&parsed.key, index),
        })
        .collect();

    ResolvedPost {
        parsed,
        author,
        likers,
        commenters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(name: &str, url: Option<&str>, title: Option<&str>) -> RawActor {
        RawActor {
            name: name.to_string(),
            profile_url: url.map(str::to_string),
            title: title.map(str::to_string),
            image_url: None,
        }
    }

    #[test]
    fn canonical_urls_drop_volatile_parts() {
        assert_eq!(
            canonicalize_url("https://WWW.LinkedIn.com/in/stefan-eder/?miniProfileUrn=abc#x").as_deref(),
            Some("https://www.linkedin.com/in/stefan-eder")
        );
        assert_eq!(
            canonicalize_url("/company/iodis/").as_deref(),
            Some("https://www.linkedin.com/company/iodis")
        );
        assert_eq!(
            canonicalize_url("http://www.linkedin.com/in/jane/recent-activity/all/").as_deref(),
            Some("https://www.linkedin.com/in/jane")
        );
        assert_eq!(canonicalize_url("not a url"), None);
    }

    #[test]
    fn same_url_different_names_same_id() {
        let a = resolve_actor(&actor("Iodis", Some("https://www.linkedin.com/company/iodis/"), None));
        let b = resolve_actor(&actor(
            "IODIS GmbH",
            Some("https://www.linkedin.com/company/iodis/?trk=public_post"),
            Some("Software"),
        ));
        assert_eq!(a.id, b.id);
        assert_eq!(a.confidence, Confidence::Strong);
        assert_eq!(a.kind, ActorKind::Organization);
    }

    #[test]
    fn company_and_person_never_merge() {
        let company = resolve_actor(&actor("Maxim", Some("https://www.linkedin.com/company/maxim"), None));
        let person = resolve_actor(&actor("Maxim", Some("https://www.linkedin.com/in/maxim"), None));
        assert_ne!(company.id, person.id);
        assert_eq!(person.kind, ActorKind::Person);
    }

    #[test]
    fn weak_keys_follow_name_and_title() {
        let a = resolve_actor(&actor("Jane  Doe", None, Some("CTO")));
        let b = resolve_actor(&actor("jane doe", None, Some(" cto ")));
        let c = resolve_actor(&actor("Jane Doe", None, Some("CEO")));
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.confidence, Confidence::Weak);
    }

    #[test]
    fn unknown_actor_is_scoped_to_post() {
        let a = unknown_actor(&PostKey::new("ai", 1));
        let b = unknown_actor(&PostKey::new("ai", 2));
        assert_ne!(a.id, b.id);
        assert_eq!(a.display_name, UNKNOWN_ACTOR_NAME);
    }

    #[test]
    fn unknown_commenters_stay_apart_from_unknown_author() {
        let key = PostKey::new("ai", 1);
        let author = unknown_actor(&key);
        let first = unknown_commenter(&key, 0);
        let second = unknown_commenter(&key, 1);
        assert_ne!(author.id, first.id);
        assert_ne!(first.id, second.id);
        assert_eq!(first.display_name, UNKNOWN_ACTOR_NAME);
    }
}
