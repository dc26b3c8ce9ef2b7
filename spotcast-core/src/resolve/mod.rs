//! Turns a loose play request into a concrete media reference.
//!
//! Resolution runs an ordered list of [`Rule`]s and keeps the first
//! non-empty result, then shapes it to the requested cardinality.

mod lookup;
mod rules;
mod shaping;

pub use rules::Rule;

use crate::catalog::Catalog;
use crate::config::SpotcastConfig;
use crate::media::{MediaReference, PlayOffset};
use crate::request::ResolutionRequest;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Settings the resolver needs from the `[playback]` and `[aliases]` config sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Market used for top tracks and album listings
    pub country: String,
    /// Playlist owner when the request names none
    pub default_user: String,
    pub user_aliases: HashMap<String, String>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            country: "CA".to_string(),
            default_user: "me".to_string(),
            user_aliases: HashMap::new(),
        }
    }
}

impl ResolverSettings {
    #[must_use]
    pub fn from_config(config: &SpotcastConfig) -> Self {
        Self {
            country: config.playback.country.clone(),
            default_user: config.playback.username.clone(),
            user_aliases: config.aliases.users.clone(),
        }
    }
}

/// Outcome of resolving one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub reference: MediaReference,
    pub offset: Option<PlayOffset>,
    /// The cascade rule that produced the reference, if any did
    pub rule: Option<Rule>,
}

pub struct Resolver {
    catalog: Arc<dyn Catalog>,
    settings: ResolverSettings,
    rng: Mutex<StdRng>,
}

impl Resolver {
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>, settings: ResolverSettings) -> Self {
        Self {
            catalog,
            settings,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Resolver with a reproducible random sequence.
    #[must_use]
    pub fn with_seed(catalog: Arc<dyn Catalog>, settings: ResolverSettings, seed: u64) -> Self {
        Self {
            catalog,
            settings,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Resolve `request` to a reference and an optional start offset.
    ///
    /// Never fails: when nothing matches the reference is [`MediaReference::Empty`].
    pub async fn resolve(&self, request: &ResolutionRequest) -> Resolution {
        let (reference, rule) = self.run_cascade(request).await;
        let reference = self.shape(request, reference).await;
        let offset = if request.random_start {
            self.random_offset(&reference).await
        } else {
            None
        };
        info!(
            "Resolved request to {} (rule: {})",
            reference.describe(),
            rule.map_or("none", Rule::name)
        );
        Resolution {
            reference,
            offset,
            rule,
        }
    }

    /// First item, or a random one when `random` is set.
    fn pick<T: Clone>(&self, items: &[T], random: bool) -> Option<T> {
        if random {
            items.choose(&mut *self.rng.lock()).cloned()
        } else {
            items.first().cloned()
        }
    }

    fn shuffle<T>(&self, items: &mut [T]) {
        items.shuffle(&mut *self.rng.lock());
    }

    fn coin(&self) -> bool {
        self.rng.lock().gen_bool(0.5)
    }

    fn sample<T: Clone>(&self, items: &[T], amount: usize) -> Vec<T> {
        items
            .choose_multiple(&mut *self.rng.lock(), amount)
            .cloned()
            .collect()
    }

    fn index_below(&self, bound: u32) -> u32 {
        self.rng.lock().gen_range(0..bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::UriKind;
    use crate::request::TrackField;
    use crate::testing::{FakeCatalog, album, artist, playlist, track};

    fn resolver(catalog: FakeCatalog) -> Resolver {
        Resolver::with_seed(Arc::new(catalog), ResolverSettings::default(), 7)
    }

    fn artist_catalog() -> FakeCatalog {
        let mut catalog = FakeCatalog::default();
        let a = artist("AAAAAAAAAAAAAAAAAAAAAA");
        catalog.add_artist("Radiohead", &a);
        catalog.top_tracks.insert(
            a.to_string(),
            vec![track("t1"), track("t2"), track("t3")],
        );
        catalog
    }

    #[tokio::test]
    async fn test_artist_multiple_yields_top_tracks() {
        let resolver = resolver(artist_catalog());
        let request = ResolutionRequest {
            artist: Some(artist("AAAAAAAAAAAAAAAAAAAAAA").to_string()),
            multiple: true,
            ..ResolutionRequest::default()
        };
        let resolution = resolver.resolve(&request).await;
        assert_eq!(resolution.rule, Some(Rule::Artist));
        assert_eq!(
            resolution.reference,
            MediaReference::TrackList(vec![track("t1"), track("t2"), track("t3")])
        );
        assert_eq!(resolution.offset, None);
    }

    #[tokio::test]
    async fn test_deterministic_without_random_search() {
        let mut catalog = artist_catalog();
        let a = artist("AAAAAAAAAAAAAAAAAAAAAA");
        catalog
            .artist_albums
            .insert(a.to_string(), vec![album("one"), album("two")]);
        catalog.add_album("One", &album("one"), Some(&a), vec![track("o1"), track("o2")]);
        catalog.recommended = vec![track("r1"), track("r2")];
        let resolver = resolver(catalog);

        let requests = [
            ResolutionRequest {
                artist: Some("Radiohead".into()),
                single: true,
                ..ResolutionRequest::default()
            },
            ResolutionRequest {
                artist: Some("Radiohead".into()),
                requested_count: 5,
                ..ResolutionRequest::default()
            },
            ResolutionRequest::default(),
        ];
        for request in &requests {
            let first = resolver.resolve(request).await;
            let second = resolver.resolve(request).await;
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn test_single_always_one_track() {
        let mut catalog = artist_catalog();
        let a = artist("AAAAAAAAAAAAAAAAAAAAAA");
        catalog.add_playlist("Mix", &playlist("mix"), vec![track("p1"), track("p2")]);
        catalog.add_album("One", &album("one"), Some(&a), vec![track("o1"), track("o2")]);
        catalog.artist_albums.insert(a.to_string(), vec![album("one")]);
        let resolver = resolver(catalog);

        let requests = [
            ResolutionRequest {
                playlist: Some(playlist("mix").to_string()),
                single: true,
                random_search: true,
                ..ResolutionRequest::default()
            },
            ResolutionRequest {
                album: Some(album("one").to_string()),
                single: true,
                ..ResolutionRequest::default()
            },
            ResolutionRequest {
                artist: Some("Radiohead".into()),
                single: true,
                multiple: true,
                ..ResolutionRequest::default()
            },
        ];
        for request in &requests {
            let resolution = resolver.resolve(request).await;
            match resolution.reference {
                MediaReference::Track(uri) => assert!(uri.is(UriKind::Track)),
                other => panic!("expected one track, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_multiple_on_track_starts_with_that_track() {
        let mut catalog = FakeCatalog::default();
        catalog.add_track("Creep", &track("creep"), None);
        catalog.recommended = vec![track("r1"), track("r2"), track("creep")];
        let resolver = resolver(catalog);

        let request = ResolutionRequest {
            track: Some(TrackField::One("Creep".into())),
            multiple: true,
            ..ResolutionRequest::default()
        };
        let MediaReference::TrackList(tracks) = resolver.resolve(&request).await.reference else {
            panic!("expected a track list");
        };
        assert_eq!(tracks, vec![track("creep"), track("r1"), track("r2")]);
    }

    #[tokio::test]
    async fn test_random_start_offsets() {
        let mut catalog = FakeCatalog::default();
        catalog.add_playlist("Mix", &playlist("mix"), vec![track("p1"), track("p2"), track("p3")]);
        catalog.add_track("Creep", &track("creep"), None);
        let resolver = resolver(catalog);

        let request = ResolutionRequest {
            playlist: Some(playlist("mix").to_string()),
            random_start: true,
            ..ResolutionRequest::default()
        };
        match resolver.resolve(&request).await.offset {
            Some(PlayOffset::Position(position)) => assert!(position < 3),
            other => panic!("expected a position, got {other:?}"),
        }

        let request = ResolutionRequest {
            track: Some(TrackField::One("Creep".into())),
            random_start: true,
            ..ResolutionRequest::default()
        };
        assert_eq!(resolver.resolve(&request).await.offset, None);
    }

    #[tokio::test]
    async fn test_nothing_resolves_to_empty() {
        let resolver = resolver(FakeCatalog::default());
        let resolution = resolver.resolve(&ResolutionRequest::default()).await;
        assert!(resolution.reference.is_empty());
        assert_eq!(resolution.rule, None);
    }
}
