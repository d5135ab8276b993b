//! Entity drafts produced by the mapper.
//!
//! # Responsibility
//! - Define one explicit struct per target entity kind.
//! - Scope every entity by `(DatasetId, LocalId)`.
//!
//! # Invariants
//! - `(dataset_id, local_id)` is unique per entity kind within a run's output.
//! - Drafts reference each other only through `LocalId`, never pointers.

use crate::date::DateValue;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Namespace isolating one genealogy collection's identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidDatasetId(pub String);

impl Display for InvalidDatasetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "dataset id must be non-empty and contain no whitespace, got `{}`",
            self.0
        )
    }
}

impl Error for InvalidDatasetId {}

impl DatasetId {
    pub fn parse(value: &str) -> Result<Self, InvalidDatasetId> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
            return Err(InvalidDatasetId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DatasetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier unique per entity kind within one dataset.
///
/// Top-level entities reuse the in-file cross-reference (`I1` for `@I1@`);
/// nested entities derive theirs from the owner (`I1.E2`, `F1@I3`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(String);

impl LocalId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LocalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Family,
    ChildLink,
    Event,
    Source,
    Citation,
    Media,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        Self::Person,
        Self::Family,
        Self::ChildLink,
        Self::Event,
        Self::Source,
        Self::Citation,
        Self::Media,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Family => "family",
            Self::ChildLink => "child_link",
            Self::Event => "event",
            Self::Source => "source",
            Self::Citation => "citation",
            Self::Media => "media",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Sex {
    pub fn from_gedcom(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "M" => Self::Male,
            "F" => Self::Female,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Unknown => "unknown",
        }
    }

    /// Parses the storage form produced by [`Sex::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonDraft {
    pub dataset_id: DatasetId,
    pub local_id: LocalId,
    /// Name text as written, slashes removed.
    pub name_display: Option<String>,
    pub given_names: Option<String>,
    pub surname: Option<String>,
    pub name_suffix: Option<String>,
    pub sex: Sex,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyDraft {
    pub dataset_id: DatasetId,
    pub local_id: LocalId,
    pub husband: Option<LocalId>,
    pub wife: Option<LocalId>,
    pub note: Option<String>,
}

/// Child-to-family relationship type from `PEDI`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pedigree {
    Birth,
    Adopted,
    Foster,
    Sealing,
}

impl Pedigree {
    pub fn from_gedcom(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "birth" => Some(Self::Birth),
            "adopted" => Some(Self::Adopted),
            "foster" => Some(Self::Foster),
            "sealing" => Some(Self::Sealing),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Birth => "birth",
            Self::Adopted => "adopted",
            Self::Foster => "foster",
            Self::Sealing => "sealing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildLinkDraft {
    pub dataset_id: DatasetId,
    pub local_id: LocalId,
    pub family: LocalId,
    pub child: LocalId,
    pub pedigree: Option<Pedigree>,
    /// Position among the family's `CHIL` lines, when known.
    pub sequence: Option<u32>,
}

impl ChildLinkDraft {
    /// `F1@I3`; `@` cannot occur inside either id, so each pair has its own.
    pub fn link_id(family: &LocalId, child: &LocalId) -> LocalId {
        LocalId::new(format!("{family}@{child}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Birth,
    Christening,
    Baptism,
    Death,
    Burial,
    Cremation,
    Adoption,
    Residence,
    Occupation,
    Education,
    Religion,
    Census,
    Emigration,
    Immigration,
    Naturalization,
    Graduation,
    Retirement,
    Marriage,
    Divorce,
    Engagement,
    MarriageBann,
    /// Generic `EVEN`, described by its `TYPE`.
    Custom,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Birth => "birth",
            Self::Christening => "christening",
            Self::Baptism => "baptism",
            Self::Death => "death",
            Self::Burial => "burial",
            Self::Cremation => "cremation",
            Self::Adoption => "adoption",
            Self::Residence => "residence",
            Self::Occupation => "occupation",
            Self::Education => "education",
            Self::Religion => "religion",
            Self::Census => "census",
            Self::Emigration => "emigration",
            Self::Immigration => "immigration",
            Self::Naturalization => "naturalization",
            Self::Graduation => "graduation",
            Self::Retirement => "retirement",
            Self::Marriage => "marriage",
            Self::Divorce => "divorce",
            Self::Engagement => "engagement",
            Self::MarriageBann => "marriage_bann",
            Self::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "local_id", rename_all = "snake_case")]
pub enum EventOwner {
    Person(LocalId),
    Family(LocalId),
}

impl EventOwner {
    pub fn local_id(&self) -> &LocalId {
        match self {
            Self::Person(id) | Self::Family(id) => id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Person(_) => EntityKind::Person,
            Self::Family(_) => EntityKind::Family,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub dataset_id: DatasetId,
    pub local_id: LocalId,
    pub owner: EventOwner,
    pub kind: EventKind,
    /// `TYPE` sub-tag, mostly used with `EVEN`.
    pub event_type: Option<String>,
    pub date: Option<DateValue>,
    pub place: Option<String>,
    /// Event line value, e.g. the occupation text of `OCCU`.
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDraft {
    pub dataset_id: DatasetId,
    pub local_id: LocalId,
    pub title: Option<String>,
    pub author: Option<String>,
    pub publication: Option<String>,
    pub abbreviation: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "local_id", rename_all = "snake_case")]
pub enum CitationOwner {
    Person(LocalId),
    Family(LocalId),
    Event(LocalId),
}

impl CitationOwner {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Person(_) => EntityKind::Person,
            Self::Family(_) => EntityKind::Family,
            Self::Event(_) => EntityKind::Event,
        }
    }

    pub fn local_id(&self) -> &LocalId {
        match self {
            Self::Person(id) | Self::Family(id) | Self::Event(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationDraft {
    pub dataset_id: DatasetId,
    pub local_id: LocalId,
    /// `None` for inline (pointer-less) citations.
    pub source: Option<LocalId>,
    pub owner: CitationOwner,
    pub page: Option<String>,
    /// `QUAY` certainty assessment, 0..=3.
    pub quality: Option<u8>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDraft {
    pub dataset_id: DatasetId,
    pub local_id: LocalId,
    pub file: String,
    pub format: Option<String>,
    pub title: Option<String>,
}

/// Any draft produced by the mapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum EntityDraft {
    Person(PersonDraft),
    Family(FamilyDraft),
    ChildLink(ChildLinkDraft),
    Event(EventDraft),
    Source(SourceDraft),
    Citation(CitationDraft),
    Media(MediaDraft),
}

impl EntityDraft {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Person(_) => EntityKind::Person,
            Self::Family(_) => EntityKind::Family,
            Self::ChildLink(_) => EntityKind::ChildLink,
            Self::Event(_) => EntityKind::Event,
            Self::Source(_) => EntityKind::Source,
            Self::Citation(_) => EntityKind::Citation,
            Self::Media(_) => EntityKind::Media,
        }
    }

    pub fn local_id(&self) -> &LocalId {
        match self {
            Self::Person(draft) => &draft.local_id,
            Self::Family(draft) => &draft.local_id,
            Self::ChildLink(draft) => &draft.local_id,
            Self::Event(draft) => &draft.local_id,
            Self::Source(draft) => &draft.local_id,
            Self::Citation(draft) => &draft.local_id,
            Self::Media(draft) => &draft.local_id,
        }
    }
}
