//! Resolution of overlapping filter sources into one canonical [`Criteria`].
//!
//! Four sources can constrain the triage set. Exactly one wins; they are
//! never merged. Highest priority first:
//!
//! 1. a session filter carrying an explicit id allow-list
//!    ("start sorting from this photo onward"),
//! 2. an ad-hoc filter picked inside the current screen,
//! 3. a precise session filter with album/date constraints,
//! 4. the global filter mode from settings.

use serde::{Deserialize, Serialize};

use crate::state::data::{DateRange, Photo, PhotoId, PhotoStatus};

/// The global filter mode (lowest-priority source).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Every photo in the catalog.
    #[default]
    All,
    /// Only the camera roll album.
    CameraOnly,
    /// Everything except the camera roll album.
    ExcludeCamera,
    /// Explicit album include/exclude lists.
    Custom {
        /// Albums to include (empty = no constraint).
        include: Vec<i64>,
        /// Albums to exclude (empty = no constraint).
        exclude: Vec<i64>,
    },
}

/// Ad-hoc filter chosen inside the triage screen. Not persisted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct PageFilter {
    /// Restrict to a single album.
    pub album: Option<i64>,
    /// Restrict to a capture-date range. Widened to end-of-day on resolve.
    pub date_range: Option<DateRange>,
}

impl PageFilter {
    /// A page filter with no constraints does not shadow lower sources.
    pub fn is_empty(&self) -> bool {
        self.album.is_none() && self.date_range.is_none()
    }
}

/// Session-scoped precise filter, persisted across app restarts.
///
/// Dates and albums are used exactly as given (no widening). A non-empty
/// `allow_ids` list overrides every other constraint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionFilter {
    /// Explicit ids to triage, in store order. Takes priority over everything.
    pub allow_ids: Vec<PhotoId>,
    /// Albums to include (empty = no constraint).
    pub albums: Vec<i64>,
    /// Capture-date range, used as given.
    pub date_range: Option<DateRange>,
}

/// The resolved, normalized predicate applied before pagination.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Criteria {
    /// Albums the photo must belong to. `None` = no constraint.
    pub include_albums: Option<Vec<i64>>,
    /// Albums the photo must not belong to. `None` = no constraint.
    pub exclude_albums: Option<Vec<i64>>,
    /// Capture-date range the photo must fall into.
    pub date_range: Option<DateRange>,
    /// Explicit id allow-list. `None` = no constraint.
    pub allow_ids: Option<Vec<PhotoId>>,
    /// Whether the date range came from a precise source (already exact).
    pub precise: bool,
}

impl Criteria {
    /// Whether an unclassified `photo` matches this predicate.
    ///
    /// The sqlite store evaluates the same predicate in SQL; this form is
    /// for in-memory stores and tests.
    pub fn matches(&self, photo: &Photo) -> bool {
        if photo.status != PhotoStatus::Unclassified {
            return false;
        }
        if let Some(ids) = &self.allow_ids {
            if !ids.contains(&photo.id) {
                return false;
            }
        }
        if let Some(include) = &self.include_albums {
            if !include.contains(&photo.album_id) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude_albums {
            if exclude.contains(&photo.album_id) {
                return false;
            }
        }
        if let Some(range) = &self.date_range {
            if !range.contains(photo.taken_at) {
                return false;
            }
        }
        true
    }

    /// Empty include/exclude lists mean "no constraint", never "match nothing".
    fn normalized(mut self) -> Self {
        if matches!(&self.include_albums, Some(v) if v.is_empty()) {
            self.include_albums = None;
        }
        if matches!(&self.exclude_albums, Some(v) if v.is_empty()) {
            self.exclude_albums = None;
        }
        if matches!(&self.allow_ids, Some(v) if v.is_empty()) {
            self.allow_ids = None;
        }
        self
    }
}

/// Merge the four filter sources into one canonical [`Criteria`].
///
/// Pure function of its inputs. `camera_album` is the configured camera
/// roll album id; camera modes degrade to `All` when it is absent.
pub fn resolve(
    mode: &FilterMode,
    page_filter: Option<&PageFilter>,
    session_filter: Option<&SessionFilter>,
    camera_album: Option<i64>,
) -> Criteria {
    // (a) explicit allow-list wins outright
    if let Some(session) = session_filter {
        if !session.allow_ids.is_empty() {
            return Criteria {
                allow_ids: Some(session.allow_ids.clone()),
                precise: true,
                ..Criteria::default()
            }
            .normalized();
        }
    }

    // (b) in-page ad-hoc filter; dates widened to end-of-day
    if let Some(page) = page_filter {
        if !page.is_empty() {
            return Criteria {
                include_albums: page.album.map(|a| vec![a]),
                date_range: page.date_range.map(|r| r.widened_to_end_of_day()),
                precise: false,
                ..Criteria::default()
            }
            .normalized();
        }
    }

    // (c) precise session filter, constraints used as given
    if let Some(session) = session_filter {
        if !session.albums.is_empty() || session.date_range.is_some() {
            return Criteria {
                include_albums: Some(session.albums.clone()),
                date_range: session.date_range,
                precise: true,
                ..Criteria::default()
            }
            .normalized();
        }
    }

    // (d) global filter mode
    let criteria = match mode {
        FilterMode::All => Criteria::default(),
        FilterMode::CameraOnly => Criteria {
            include_albums: camera_album.map(|a| vec![a]),
            ..Criteria::default()
        },
        FilterMode::ExcludeCamera => Criteria {
            exclude_albums: camera_album.map(|a| vec![a]),
            ..Criteria::default()
        },
        FilterMode::Custom { include, exclude } => Criteria {
            include_albums: Some(include.clone()),
            exclude_albums: Some(exclude.clone()),
            ..Criteria::default()
        },
    };
    criteria.normalized()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_ids(ids: Vec<PhotoId>) -> SessionFilter {
        SessionFilter {
            allow_ids: ids,
            albums: vec![7],
            date_range: Some(DateRange { start: 0, end: 100 }),
        }
    }

    #[test]
    fn test_allow_list_shadows_everything() {
        let page = PageFilter {
            album: Some(3),
            date_range: None,
        };
        let resolved = resolve(
            &FilterMode::CameraOnly,
            Some(&page),
            Some(&session_with_ids(vec![10, 11])),
            Some(1),
        );
        assert_eq!(resolved.allow_ids, Some(vec![10, 11]));
        assert!(resolved.precise);
        // lower-priority sources are ignored entirely, not merged
        assert_eq!(resolved.include_albums, None);
        assert_eq!(resolved.date_range, None);
    }

    #[test]
    fn test_page_filter_shadows_session_and_mode() {
        let page = PageFilter {
            album: Some(3),
            date_range: Some(DateRange {
                start: 0,
                end: 1_710_028_800,
            }),
        };
        let session = SessionFilter {
            allow_ids: vec![],
            albums: vec![7],
            date_range: None,
        };
        let resolved = resolve(&FilterMode::CameraOnly, Some(&page), Some(&session), Some(1));
        assert_eq!(resolved.include_albums, Some(vec![3]));
        // non-precise source: end widened to 23:59:59 of its day
        assert_eq!(
            resolved.date_range,
            Some(DateRange {
                start: 0,
                end: 1_710_028_800 + 86_399,
            })
        );
        assert!(!resolved.precise);
    }

    #[test]
    fn test_precise_session_dates_pass_through() {
        let session = SessionFilter {
            allow_ids: vec![],
            albums: vec![7],
            date_range: Some(DateRange {
                start: 100,
                end: 1_710_028_800,
            }),
        };
        let resolved = resolve(&FilterMode::All, None, Some(&session), None);
        assert_eq!(resolved.include_albums, Some(vec![7]));
        assert_eq!(
            resolved.date_range,
            Some(DateRange {
                start: 100,
                end: 1_710_028_800,
            })
        );
        assert!(resolved.precise);
    }

    #[test]
    fn test_empty_page_filter_does_not_shadow() {
        let page = PageFilter::default();
        let resolved = resolve(&FilterMode::CameraOnly, Some(&page), None, Some(42));
        assert_eq!(resolved.include_albums, Some(vec![42]));
    }

    #[test]
    fn test_camera_modes() {
        let only = resolve(&FilterMode::CameraOnly, None, None, Some(5));
        assert_eq!(only.include_albums, Some(vec![5]));

        let exclude = resolve(&FilterMode::ExcludeCamera, None, None, Some(5));
        assert_eq!(exclude.exclude_albums, Some(vec![5]));

        // no camera album configured: degrade to All
        let degraded = resolve(&FilterMode::CameraOnly, None, None, None);
        assert_eq!(degraded, Criteria::default());
    }

    #[test]
    fn test_empty_lists_normalize_to_no_constraint() {
        let resolved = resolve(
            &FilterMode::Custom {
                include: vec![],
                exclude: vec![],
            },
            None,
            None,
            None,
        );
        assert_eq!(resolved.include_albums, None);
        assert_eq!(resolved.exclude_albums, None);
    }

    #[test]
    fn test_matches_respects_all_constraints() {
        let criteria = Criteria {
            include_albums: Some(vec![1]),
            exclude_albums: None,
            date_range: Some(DateRange { start: 10, end: 20 }),
            allow_ids: None,
            precise: true,
        };
        let photo = Photo {
            id: 1,
            path: "/p/a.jpg".into(),
            album_id: 1,
            taken_at: 15,
            status: PhotoStatus::Unclassified,
        };
        assert!(criteria.matches(&photo));

        let mut wrong_album = photo.clone();
        wrong_album.album_id = 2;
        assert!(!criteria.matches(&wrong_album));

        let mut out_of_range = photo.clone();
        out_of_range.taken_at = 25;
        assert!(!criteria.matches(&out_of_range));

        let mut classified = photo;
        classified.status = PhotoStatus::Keep;
        assert!(!criteria.matches(&classified));
    }
}
