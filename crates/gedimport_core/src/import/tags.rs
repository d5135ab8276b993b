//! Closed tag dictionaries for record dispatch.
//!
//! Every tag the importer understands has a variant; everything else maps to
//! `Unknown` so callers must handle the unknown-tag path explicitly.

use crate::model::draft::EventKind;

/// Top-level (level-0) record tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTag {
    Header,
    Individual,
    Family,
    Source,
    Media,
    /// Recognized records that are not imported (`NOTE`, `REPO`, `SUBM`, `SUBN`).
    NotImported,
    Trailer,
    Unknown,
}

impl RecordTag {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "HEAD" => Self::Header,
            "INDI" => Self::Individual,
            "FAM" => Self::Family,
            "SOUR" => Self::Source,
            "OBJE" => Self::Media,
            "NOTE" | "REPO" | "SUBM" | "SUBN" | "SNOTE" => Self::NotImported,
            "TRLR" => Self::Trailer,
            _ => Self::Unknown,
        }
    }
}

/// Nested tags; meaning can depend on the enclosing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactTag {
    Name,
    GivenName,
    Surname,
    NameSuffix,
    Sex,
    Note,
    Event(EventKind),
    FamilyAsChild,
    FamilyAsSpouse,
    Husband,
    Wife,
    Child,
    Pedigree,
    Source,
    Media,
    Date,
    Place,
    Type,
    Page,
    Quality,
    Data,
    Text,
    File,
    Format,
    Title,
    Author,
    Publication,
    Abbreviation,
    Gedcom,
    Version,
    Charset,
    Language,
    /// Standard tag the importer deliberately does not map.
    Recognized,
    Unknown,
}

impl FactTag {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "NAME" => Self::Name,
            "GIVN" => Self::GivenName,
            "SURN" => Self::Surname,
            "NSFX" => Self::NameSuffix,
            "SEX" => Self::Sex,
            "NOTE" => Self::Note,
            "FAMC" => Self::FamilyAsChild,
            "FAMS" => Self::FamilyAsSpouse,
            "HUSB" => Self::Husband,
            "WIFE" => Self::Wife,
            "CHIL" => Self::Child,
            "PEDI" => Self::Pedigree,
            "SOUR" => Self::Source,
            "OBJE" => Self::Media,
            "DATE" => Self::Date,
            "PLAC" => Self::Place,
            "TYPE" => Self::Type,
            "PAGE" => Self::Page,
            "QUAY" => Self::Quality,
            "DATA" => Self::Data,
            "TEXT" => Self::Text,
            "FILE" => Self::File,
            "FORM" => Self::Format,
            "TITL" => Self::Title,
            "AUTH" => Self::Author,
            "PUBL" => Self::Publication,
            "ABBR" => Self::Abbreviation,
            "GEDC" => Self::Gedcom,
            "VERS" => Self::Version,
            "CHAR" => Self::Charset,
            "LANG" => Self::Language,
            "NPFX" | "NICK" | "SPFX" | "CHAN" | "TIME" | "RIN" | "REFN" | "RFN" | "AFN"
            | "RESN" | "AGE" | "CAUS" | "ADDR" | "PHON" | "EMAIL" | "WWW" | "AGNC" | "ASSO"
            | "ALIA" | "NCHI" | "REPO" | "CALN" | "MEDI" | "ROLE" | "SUBM" | "DEST" | "COPR"
            | "CORP" | "STAT" | "MAP" | "LATI" | "LONG" | "FONE" | "ROMN" => {
                Self::Recognized
            }
            _ => event_kind(tag).map_or(Self::Unknown, Self::Event),
        }
    }
}

fn event_kind(tag: &str) -> Option<EventKind> {
    let kind = match tag {
        "BIRT" => EventKind::Birth,
        "CHR" => EventKind::Christening,
        "BAPM" => EventKind::Baptism,
        "DEAT" => EventKind::Death,
        "BURI" => EventKind::Burial,
        "CREM" => EventKind::Cremation,
        "ADOP" => EventKind::Adoption,
        "RESI" => EventKind::Residence,
        "OCCU" => EventKind::Occupation,
        "EDUC" => EventKind::Education,
        "RELI" => EventKind::Religion,
        "CENS" => EventKind::Census,
        "EMIG" => EventKind::Emigration,
        "IMMI" => EventKind::Immigration,
        "NATU" => EventKind::Naturalization,
        "GRAD" => EventKind::Graduation,
        "RETI" => EventKind::Retirement,
        "MARR" => EventKind::Marriage,
        "DIV" => EventKind::Divorce,
        "ENGA" => EventKind::Engagement,
        "MARB" => EventKind::MarriageBann,
        "EVEN" => EventKind::Custom,
        _ => return None,
    };
    Some(kind)
}
