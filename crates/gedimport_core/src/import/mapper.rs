//! Record-to-draft mapping.
//!
//! # Responsibility
//! - Dispatch assembled records to entity drafts via closed tag tables.
//! - Normalize event dates into display + sortable values.
//! - Register definitions and references with the cross-reference resolver.
//!
//! # Invariants
//! - A record either maps completely or fails with a [`MappingError`];
//!   a failed record leaves the resolver untouched.
//! - Relationship tags produce `ChildLinkDraft`s instead of mutating the
//!   parent draft.
//! - Unknown tags become warnings, never errors.

use crate::date::normalize;
use crate::import::tags::{FactTag, RecordTag};
use crate::import::xref::{Declaration, XrefResolver};
use crate::model::draft::{
    ChildLinkDraft, CitationDraft, CitationOwner, DatasetId, EntityDraft, EntityKind, EventDraft,
    EventKind, EventOwner, FamilyDraft, LocalId, MediaDraft, Pedigree, PersonDraft, Sex,
    SourceDraft,
};
use crate::model::run::{HeaderInfo, ImportError, Severity};
use crate::parse::Record;
use std::error::Error;
use std::fmt::{Display, Formatter};

const SUPPORTED_CHARSETS: &[&str] = &["UTF-8", "UTF8", "ASCII"];

/// Record-level switches taken from the import options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapperOptions {
    pub import_sources: bool,
    pub import_media: bool,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            import_sources: true,
            import_media: true,
        }
    }
}

/// Why a well-formed record produced no drafts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SourcesDisabled,
    MediaDisabled,
    NotImported,
    UnknownRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordDisposition {
    Entity {
        kind: EntityKind,
        declaration: Declaration,
    },
    Header(HeaderInfo),
    Trailer,
    Skipped(SkipReason),
}

/// Successful mapping result for one top-level record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRecord {
    pub disposition: RecordDisposition,
    pub drafts: Vec<EntityDraft>,
    pub warnings: Vec<ImportError>,
}

/// Record violates an entity's minimum required structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    MissingXref { tag: String, line: usize },
    EmptyFamily { xref: String, line: usize },
    MissingPointer { tag: String, line: usize },
    MissingMediaFile { xref: String, line: usize },
}

impl MappingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingXref { .. } => "missing_xref",
            Self::EmptyFamily { .. } => "empty_family",
            Self::MissingPointer { .. } => "missing_pointer",
            Self::MissingMediaFile { .. } => "missing_media_file",
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Self::MissingXref { line, .. }
            | Self::EmptyFamily { line, .. }
            | Self::MissingPointer { line, .. }
            | Self::MissingMediaFile { line, .. } => *line,
        }
    }
}

impl Display for MappingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingXref { tag, line } => {
                write!(f, "line {line}: `{tag}` record has no cross-reference")
            }
            Self::EmptyFamily { xref, line } => {
                write!(f, "line {line}: family @{xref}@ has no members")
            }
            Self::MissingPointer { tag, line } => {
                write!(f, "line {line}: `{tag}` requires a cross-reference pointer")
            }
            Self::MissingMediaFile { xref, line } => {
                write!(f, "line {line}: media @{xref}@ has no FILE")
            }
        }
    }
}

impl Error for MappingError {}

#[derive(Debug, Clone, Copy)]
struct PendingReference<'r> {
    xref: &'r str,
    kind: EntityKind,
    line: usize,
}

/// Per-record scratch state; applied to the resolver only on success.
struct MapContext<'r> {
    label: String,
    drafts: Vec<EntityDraft>,
    warnings: Vec<ImportError>,
    references: Vec<PendingReference<'r>>,
    event_seq: u32,
    citation_seq: u32,
}

impl<'r> MapContext<'r> {
    fn new(record: &Record) -> Self {
        Self {
            label: record.label(),
            drafts: Vec::new(),
            warnings: Vec::new(),
            references: Vec::new(),
            event_seq: 0,
            citation_seq: 0,
        }
    }

    fn warn(&mut self, line: usize, code: &str, message: String) {
        self.warnings.push(
            ImportError::new(Severity::Warning, code, message)
                .at_line(line)
                .in_record(self.label.clone()),
        );
    }

    fn unknown_tag(&mut self, node: &Record) {
        self.warn(
            node.line,
            "unknown_tag",
            format!("unsupported tag `{}` ignored", node.tag),
        );
    }

    fn unexpected_tag(&mut self, node: &Record) {
        self.warn(
            node.line,
            "unexpected_tag",
            format!("tag `{}` is not valid here and was ignored", node.tag),
        );
    }

    fn reference(&mut self, node: &'r Record, kind: EntityKind) -> Result<LocalId, MappingError> {
        let xref = node.pointer().ok_or_else(|| MappingError::MissingPointer {
            tag: node.tag.clone(),
            line: node.line,
        })?;
        self.references.push(PendingReference {
            xref,
            kind,
            line: node.line,
        });
        Ok(XrefResolver::issue_id(xref))
    }

    fn next_event_id(&mut self, owner: &LocalId) -> LocalId {
        self.event_seq += 1;
        LocalId::new(format!("{owner}.E{}", self.event_seq))
    }

    fn next_citation_id(&mut self, owner: &LocalId) -> LocalId {
        self.citation_seq += 1;
        LocalId::new(format!("{owner}.C{}", self.citation_seq))
    }
}

/// Maps top-level records into drafts for one dataset.
#[derive(Debug, Clone)]
pub struct EntityMapper {
    dataset_id: DatasetId,
    options: MapperOptions,
}

impl EntityMapper {
    pub fn new(dataset_id: DatasetId, options: MapperOptions) -> Self {
        Self {
            dataset_id,
            options,
        }
    }

    pub fn dataset_id(&self) -> &DatasetId {
        &self.dataset_id
    }

    /// Maps one top-level record.
    ///
    /// On success the record's definition and every pointer it carries are
    /// registered with `resolver`; on failure the resolver is not touched.
    pub fn map(
        &self,
        record: &Record,
        resolver: &mut XrefResolver,
    ) -> Result<MappedRecord, MappingError> {
        let mut ctx = MapContext::new(record);

        let entity_kind = match RecordTag::from_tag(&record.tag) {
            RecordTag::Header => {
                let header = self.map_header(record, &mut ctx);
                return Ok(finish(ctx, RecordDisposition::Header(header)));
            }
            RecordTag::Trailer => return Ok(finish(ctx, RecordDisposition::Trailer)),
            RecordTag::NotImported => {
                return Ok(finish(
                    ctx,
                    RecordDisposition::Skipped(SkipReason::NotImported),
                ));
            }
            RecordTag::Unknown => {
                ctx.warn(
                    record.line,
                    "unknown_record",
                    format!("unsupported record `{}` ignored", record.tag),
                );
                return Ok(finish(
                    ctx,
                    RecordDisposition::Skipped(SkipReason::UnknownRecord),
                ));
            }
            RecordTag::Source if !self.options.import_sources => {
                return Ok(finish(
                    ctx,
                    RecordDisposition::Skipped(SkipReason::SourcesDisabled),
                ));
            }
            RecordTag::Media if !self.options.import_media => {
                return Ok(finish(
                    ctx,
                    RecordDisposition::Skipped(SkipReason::MediaDisabled),
                ));
            }
            RecordTag::Individual => {
                self.map_person(record, required_xref(record)?, &mut ctx)?;
                EntityKind::Person
            }
            RecordTag::Family => {
                self.map_family(record, required_xref(record)?, &mut ctx)?;
                EntityKind::Family
            }
            RecordTag::Source => {
                self.map_source(record, required_xref(record)?, &mut ctx);
                EntityKind::Source
            }
            RecordTag::Media => {
                self.map_media(record, required_xref(record)?, &mut ctx)?;
                EntityKind::Media
            }
        };

        let xref = required_xref(record)?;
        for reference in &ctx.references {
            resolver.resolve(reference.xref, reference.kind, reference.line);
        }
        let declaration = resolver.declare(xref, entity_kind, record.line);
        if let Some(previous_line) = declaration.duplicate_of {
            ctx.warn(
                record.line,
                "duplicate_xref",
                format!(
                    "@{xref}@ was already defined at line {previous_line}; the later definition wins"
                ),
            );
        }

        Ok(finish(
            ctx,
            RecordDisposition::Entity {
                kind: entity_kind,
                declaration,
            },
        ))
    }

    fn map_header(&self, record: &Record, ctx: &mut MapContext<'_>) -> HeaderInfo {
        let mut header = HeaderInfo::default();
        for child in &record.children {
            match FactTag::from_tag(&child.tag) {
                FactTag::Source => {
                    header.source_system = child
                        .attribute("NAME")
                        .and_then(non_empty)
                        .or_else(|| non_empty(&child.value));
                }
                FactTag::Gedcom => {
                    header.gedcom_version = child.attribute("VERS").and_then(non_empty);
                }
                FactTag::Charset => header.charset = non_empty(&child.value),
                FactTag::Language => header.language = non_empty(&child.value),
                // Remaining header lines are submission bookkeeping.
                _ => {}
            }
        }

        if let Some(charset) = header.charset.as_deref() {
            let upper = charset.to_ascii_uppercase();
            if !SUPPORTED_CHARSETS.contains(&upper.as_str()) {
                ctx.warn(
                    record.line,
                    "unsupported_charset",
                    format!("declared charset `{charset}` is read as UTF-8"),
                );
            }
        }
        header
    }

    fn map_person<'r>(
        &self,
        record: &'r Record,
        xref: &str,
        ctx: &mut MapContext<'r>,
    ) -> Result<(), MappingError> {
        let local_id = XrefResolver::issue_id(xref);
        let mut person = PersonDraft {
            dataset_id: self.dataset_id.clone(),
            local_id: local_id.clone(),
            name_display: None,
            given_names: None,
            surname: None,
            name_suffix: None,
            sex: Sex::Unknown,
            note: None,
        };

        for child in &record.children {
            match FactTag::from_tag(&child.tag) {
                FactTag::Name => {
                    // Only the primary name is imported.
                    if person.name_display.is_none() {
                        let name = parse_name(child);
                        person.name_display = name.display;
                        person.given_names = name.given;
                        person.surname = name.surname;
                        person.name_suffix = name.suffix;
                    }
                }
                FactTag::Sex => person.sex = Sex::from_gedcom(&child.value),
                FactTag::Note => append_note(&mut person.note, child),
                FactTag::Event(kind) => {
                    let owner = EventOwner::Person(local_id.clone());
                    self.map_event(child, kind, owner, &local_id, ctx);
                }
                FactTag::FamilyAsChild => {
                    let family = ctx.reference(child, EntityKind::Family)?;
                    let pedigree = child.attribute("PEDI").and_then(|value| {
                        let parsed = Pedigree::from_gedcom(value);
                        if parsed.is_none() {
                            ctx.warn(
                                child.line,
                                "unknown_pedigree",
                                format!("pedigree `{value}` not recognized"),
                            );
                        }
                        parsed
                    });
                    ctx.drafts.push(EntityDraft::ChildLink(ChildLinkDraft {
                        dataset_id: self.dataset_id.clone(),
                        local_id: ChildLinkDraft::link_id(&family, &local_id),
                        family,
                        child: local_id.clone(),
                        pedigree,
                        sequence: None,
                    }));
                }
                FactTag::FamilyAsSpouse => {
                    // Spouse links are owned by the family's HUSB/WIFE.
                    ctx.reference(child, EntityKind::Family)?;
                }
                FactTag::Source => {
                    let owner = CitationOwner::Person(local_id.clone());
                    if let Some(citation) = self.map_citation(child, owner, &local_id, ctx) {
                        ctx.drafts.push(EntityDraft::Citation(citation));
                    }
                }
                FactTag::Media | FactTag::Recognized => {}
                FactTag::Unknown => ctx.unknown_tag(child),
                _ => ctx.unexpected_tag(child),
            }
        }

        ctx.drafts.insert(0, EntityDraft::Person(person));
        Ok(())
    }

    fn map_family<'r>(
        &self,
        record: &'r Record,
        xref: &str,
        ctx: &mut MapContext<'r>,
    ) -> Result<(), MappingError> {
        let local_id = XrefResolver::issue_id(xref);
        let mut family = FamilyDraft {
            dataset_id: self.dataset_id.clone(),
            local_id: local_id.clone(),
            husband: None,
            wife: None,
            note: None,
        };
        let mut children = 0u32;

        for child in &record.children {
            match FactTag::from_tag(&child.tag) {
                FactTag::Husband => {
                    let husband = ctx.reference(child, EntityKind::Person)?;
                    if family.husband.is_some() {
                        ctx.warn(
                            child.line,
                            "duplicate_spouse",
                            "additional HUSB ignored".to_string(),
                        );
                    } else {
                        family.husband = Some(husband);
                    }
                }
                FactTag::Wife => {
                    let wife = ctx.reference(child, EntityKind::Person)?;
                    if family.wife.is_some() {
                        ctx.warn(
                            child.line,
                            "duplicate_spouse",
                            "additional WIFE ignored".to_string(),
                        );
                    } else {
                        family.wife = Some(wife);
                    }
                }
                FactTag::Child => {
                    let person = ctx.reference(child, EntityKind::Person)?;
                    children += 1;
                    ctx.drafts.push(EntityDraft::ChildLink(ChildLinkDraft {
                        dataset_id: self.dataset_id.clone(),
                        local_id: ChildLinkDraft::link_id(&local_id, &person),
                        family: local_id.clone(),
                        child: person,
                        pedigree: None,
                        sequence: Some(children),
                    }));
                }
                FactTag::Note => append_note(&mut family.note, child),
                FactTag::Event(kind) => {
                    let owner = EventOwner::Family(local_id.clone());
                    self.map_event(child, kind, owner, &local_id, ctx);
                }
                FactTag::Source => {
                    let owner = CitationOwner::Family(local_id.clone());
                    if let Some(citation) = self.map_citation(child, owner, &local_id, ctx) {
                        ctx.drafts.push(EntityDraft::Citation(citation));
                    }
                }
                FactTag::Media | FactTag::Recognized => {}
                FactTag::Unknown => ctx.unknown_tag(child),
                _ => ctx.unexpected_tag(child),
            }
        }

        if family.husband.is_none() && family.wife.is_none() && children == 0 {
            return Err(MappingError::EmptyFamily {
                xref: xref.to_string(),
                line: record.line,
            });
        }

        ctx.drafts.insert(0, EntityDraft::Family(family));
        Ok(())
    }

    fn map_source(&self, record: &Record, xref: &str, ctx: &mut MapContext<'_>) {
        let mut source = SourceDraft {
            dataset_id: self.dataset_id.clone(),
            local_id: XrefResolver::issue_id(xref),
            title: None,
            author: None,
            publication: None,
            abbreviation: None,
            text: None,
        };

        for child in &record.children {
            match FactTag::from_tag(&child.tag) {
                FactTag::Title => source.title = non_empty(&child.value),
                FactTag::Author => source.author = non_empty(&child.value),
                FactTag::Publication => source.publication = non_empty(&child.value),
                FactTag::Abbreviation => source.abbreviation = non_empty(&child.value),
                FactTag::Text => source.text = non_empty(&child.value),
                FactTag::Data | FactTag::Note | FactTag::Media | FactTag::Recognized => {}
                FactTag::Unknown => ctx.unknown_tag(child),
                _ => ctx.unexpected_tag(child),
            }
        }

        ctx.drafts.push(EntityDraft::Source(source));
    }

    fn map_media(
        &self,
        record: &Record,
        xref: &str,
        ctx: &mut MapContext<'_>,
    ) -> Result<(), MappingError> {
        let file_node = record.child("FILE");
        let file = file_node
            .and_then(|node| non_empty(&node.value))
            .ok_or_else(|| MappingError::MissingMediaFile {
                xref: xref.to_string(),
                line: record.line,
            })?;

        let nested = |tag: &str| file_node.and_then(|node| node.attribute(tag));
        let format = nested("FORM")
            .or_else(|| record.attribute("FORM"))
            .and_then(non_empty);
        let title = nested("TITL")
            .or_else(|| record.attribute("TITL"))
            .and_then(non_empty);

        for child in &record.children {
            match FactTag::from_tag(&child.tag) {
                FactTag::File
                | FactTag::Format
                | FactTag::Title
                | FactTag::Note
                | FactTag::Source
                | FactTag::Recognized => {}
                FactTag::Unknown => ctx.unknown_tag(child),
                _ => ctx.unexpected_tag(child),
            }
        }

        ctx.drafts.push(EntityDraft::Media(MediaDraft {
            dataset_id: self.dataset_id.clone(),
            local_id: XrefResolver::issue_id(xref),
            file,
            format,
            title,
        }));
        Ok(())
    }

    fn map_event<'r>(
        &self,
        node: &'r Record,
        kind: EventKind,
        owner: EventOwner,
        top_level: &LocalId,
        ctx: &mut MapContext<'r>,
    ) {
        let local_id = ctx.next_event_id(top_level);
        let mut event = EventDraft {
            dataset_id: self.dataset_id.clone(),
            local_id: local_id.clone(),
            owner,
            kind,
            event_type: None,
            date: None,
            place: None,
            description: event_description(&node.value),
        };
        let mut citations = Vec::new();

        for sub in &node.children {
            match FactTag::from_tag(&sub.tag) {
                FactTag::Date => {
                    let value = normalize(&sub.value);
                    if !value.is_valid {
                        ctx.warn(
                            sub.line,
                            "invalid_date",
                            format!("date `{}` could not be parsed", sub.value.trim()),
                        );
                    }
                    event.date = Some(value);
                }
                FactTag::Place => event.place = non_empty(&sub.value),
                FactTag::Type => event.event_type = non_empty(&sub.value),
                FactTag::Source => {
                    let owner = CitationOwner::Event(local_id.clone());
                    if let Some(citation) = self.map_citation(sub, owner, top_level, ctx) {
                        citations.push(EntityDraft::Citation(citation));
                    }
                }
                FactTag::Note | FactTag::Media | FactTag::Recognized => {}
                FactTag::Unknown => ctx.unknown_tag(sub),
                _ => ctx.unexpected_tag(sub),
            }
        }

        ctx.drafts.push(EntityDraft::Event(event));
        ctx.drafts.extend(citations);
    }

    fn map_citation<'r>(
        &self,
        node: &'r Record,
        owner: CitationOwner,
        top_level: &LocalId,
        ctx: &mut MapContext<'r>,
    ) -> Option<CitationDraft> {
        if !self.options.import_sources {
            return None;
        }

        let source = match node.pointer() {
            Some(_) => ctx.reference(node, EntityKind::Source).ok(),
            None => None,
        };
        let inline_text = if source.is_none() {
            non_empty(&node.value)
        } else {
            None
        };
        if source.is_none() && inline_text.is_none() {
            ctx.warn(
                node.line,
                "empty_citation",
                "citation has neither a source pointer nor text".to_string(),
            );
            return None;
        }

        let mut citation = CitationDraft {
            dataset_id: self.dataset_id.clone(),
            local_id: ctx.next_citation_id(top_level),
            source,
            owner,
            page: None,
            quality: None,
            text: inline_text,
        };

        for sub in &node.children {
            match FactTag::from_tag(&sub.tag) {
                FactTag::Page => citation.page = non_empty(&sub.value),
                FactTag::Quality => match sub.value.trim().parse::<u8>() {
                    Ok(value) if value <= 3 => citation.quality = Some(value),
                    _ => ctx.warn(
                        sub.line,
                        "invalid_quality",
                        format!("QUAY `{}` must be 0..=3", sub.value.trim()),
                    ),
                },
                FactTag::Data => {
                    if citation.text.is_none() {
                        citation.text = sub.attribute("TEXT").and_then(non_empty);
                    }
                }
                FactTag::Text => {
                    if citation.text.is_none() {
                        citation.text = non_empty(&sub.value);
                    }
                }
                FactTag::Note | FactTag::Media | FactTag::Recognized => {}
                FactTag::Unknown => ctx.unknown_tag(sub),
                _ => ctx.unexpected_tag(sub),
            }
        }

        Some(citation)
    }
}

fn finish(ctx: MapContext<'_>, disposition: RecordDisposition) -> MappedRecord {
    MappedRecord {
        disposition,
        drafts: ctx.drafts,
        warnings: ctx.warnings,
    }
}

fn required_xref(record: &Record) -> Result<&str, MappingError> {
    record
        .xref
        .as_deref()
        .ok_or_else(|| MappingError::MissingXref {
            tag: record.tag.clone(),
            line: record.line,
        })
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `1 DEAT Y` only asserts the event happened; it carries no description.
fn event_description(value: &str) -> Option<String> {
    match value.trim() {
        "Y" | "y" => None,
        other => non_empty(other),
    }
}

fn append_note(note: &mut Option<String>, node: &Record) {
    // Shared NOTE records are not imported, so pointers are dropped.
    if node.pointer().is_some() {
        return;
    }
    let Some(text) = non_empty(&node.value) else {
        return;
    };
    match note {
        Some(existing) => {
            existing.push_str("\n\n");
            existing.push_str(&text);
        }
        None => *note = Some(text),
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ParsedName {
    display: Option<String>,
    given: Option<String>,
    surname: Option<String>,
    suffix: Option<String>,
}

/// Splits `John /Smith/ Jr` into given, surname and suffix parts.
fn parse_name(node: &Record) -> ParsedName {
    let raw = node.value.trim();
    let (given, surname, suffix) = match raw.find('/') {
        Some(start) => {
            let after = &raw[start + 1..];
            match after.find('/') {
                Some(end) => (&raw[..start], &after[..end], &after[end + 1..]),
                None => (&raw[..start], after, ""),
            }
        }
        None => (raw, "", ""),
    };

    let given = node
        .attribute("GIVN")
        .and_then(non_empty)
        .or_else(|| non_empty(given));
    let surname = node
        .attribute("SURN")
        .and_then(non_empty)
        .or_else(|| non_empty(surname));
    let suffix = node
        .attribute("NSFX")
        .and_then(non_empty)
        .or_else(|| non_empty(suffix));

    let display = [given.as_deref(), surname.as_deref(), suffix.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    ParsedName {
        display: non_empty(&display),
        given,
        surname,
        suffix,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_name, EntityMapper, MapperOptions, MappingError, RecordDisposition, SkipReason};
    use crate::date::{DatePrecision, DateQualifier};
    use crate::import::xref::XrefResolver;
    use crate::model::draft::{
        CitationOwner, DatasetId, EntityDraft, EntityKind, EventKind, EventOwner, Pedigree, Sex,
    };
    use crate::parse::{Assembler, Parsed, Record, Tokenizer};
    use std::io::Cursor;

    fn dataset() -> DatasetId {
        DatasetId::parse("tree").unwrap()
    }

    fn records(input: &str) -> Vec<Record> {
        Assembler::new(Tokenizer::new(Cursor::new(input.as_bytes().to_vec())))
            .filter_map(|item| match item.unwrap() {
                Parsed::Item(record) => Some(record),
                Parsed::Issue(_) => None,
            })
            .collect()
    }

    fn single(input: &str) -> Record {
        records(input).remove(0)
    }

    #[test]
    fn person_maps_name_sex_events_and_child_link() {
        let record = single(
            "\
0 @I1@ INDI
1 NAME John /Smith/ Jr
1 SEX M
1 BIRT
2 DATE ABT 1822
2 PLAC Boston, Massachusetts
1 OCCU Cooper
1 FAMC @F1@
2 PEDI adopted
",
        );
        let mapper = EntityMapper::new(dataset(), MapperOptions::default());
        let mut resolver = XrefResolver::new(dataset());
        let mapped = mapper.map(&record, &mut resolver).unwrap();

        let EntityDraft::Person(person) = &mapped.drafts[0] else {
            panic!("person draft expected first");
        };
        assert_eq!(person.local_id.as_str(), "I1");
        assert_eq!(person.given_names.as_deref(), Some("John"));
        assert_eq!(person.surname.as_deref(), Some("Smith"));
        assert_eq!(person.name_suffix.as_deref(), Some("Jr"));
        assert_eq!(person.name_display.as_deref(), Some("John Smith Jr"));
        assert_eq!(person.sex, Sex::Male);

        let events: Vec<_> = mapped
            .drafts
            .iter()
            .filter_map(|draft| match draft {
                EntityDraft::Event(event) => Some(event),
                _ => None,
            })
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Birth);
        assert_eq!(events[0].local_id.as_str(), "I1.E1");
        assert_eq!(events[0].owner, EventOwner::Person(person.local_id.clone()));
        let birth_date = events[0].date.as_ref().unwrap();
        assert_eq!(birth_date.qualifier, DateQualifier::About);
        assert_eq!(birth_date.precision, Some(DatePrecision::Year));
        assert_eq!(events[0].place.as_deref(), Some("Boston, Massachusetts"));
        assert_eq!(events[1].kind, EventKind::Occupation);
        assert_eq!(events[1].description.as_deref(), Some("Cooper"));

        let link = mapped
            .drafts
            .iter()
            .find_map(|draft| match draft {
                EntityDraft::ChildLink(link) => Some(link),
                _ => None,
            })
            .unwrap();
        assert_eq!(link.family.as_str(), "F1");
        assert_eq!(link.child.as_str(), "I1");
        assert_eq!(link.pedigree, Some(Pedigree::Adopted));

        assert!(matches!(
            mapped.disposition,
            RecordDisposition::Entity { kind: EntityKind::Person, .. }
        ));
        assert!(mapped.warnings.is_empty());
        assert!(resolver.is_declared("I1"));
        assert!(!resolver.is_declared("F1"));
    }

    #[test]
    fn family_children_become_ordered_links() {
        let record = single(
            "\
0 @F1@ FAM
1 HUSB @I1@
1 WIFE @I2@
1 CHIL @I3@
1 CHIL @I4@
1 MARR
2 DATE 12 JUN 1845
",
        );
        let mapper = EntityMapper::new(dataset(), MapperOptions::default());
        let mut resolver = XrefResolver::new(dataset());
        let mapped = mapper.map(&record, &mut resolver).unwrap();

        let EntityDraft::Family(family) = &mapped.drafts[0] else {
            panic!("family draft expected first");
        };
        assert_eq!(family.husband.as_ref().unwrap().as_str(), "I1");
        assert_eq!(family.wife.as_ref().unwrap().as_str(), "I2");

        let links: Vec<_> = mapped
            .drafts
            .iter()
            .filter_map(|draft| match draft {
                EntityDraft::ChildLink(link) => Some((link.child.as_str(), link.sequence)),
                _ => None,
            })
            .collect();
        assert_eq!(links, vec![("I3", Some(1)), ("I4", Some(2))]);
        assert_eq!(resolver.len(), 5);
    }

    #[test]
    fn family_without_members_is_a_mapping_error() {
        let record = single("0 @F9@ FAM\n1 MARR\n2 DATE 1900\n");
        let mapper = EntityMapper::new(dataset(), MapperOptions::default());
        let mut resolver = XrefResolver::new(dataset());
        let err = mapper.map(&record, &mut resolver).unwrap_err();
        assert_eq!(
            err,
            MappingError::EmptyFamily {
                xref: "F9".to_string(),
                line: 1
            }
        );
        assert!(resolver.is_empty());
    }

    #[test]
    fn failed_record_leaves_resolver_untouched() {
        let record = single("0 @I1@ INDI\n1 FAMS @F1@\n1 FAMC\n");
        let mapper = EntityMapper::new(dataset(), MapperOptions::default());
        let mut resolver = XrefResolver::new(dataset());
        let err = mapper.map(&record, &mut resolver).unwrap_err();
        assert_eq!(err.code(), "missing_pointer");
        assert_eq!(err.line(), 3);
        assert!(resolver.is_empty());
    }

    #[test]
    fn person_without_xref_is_a_mapping_error() {
        let record = single("0 INDI\n1 NAME Lost /Soul/\n");
        let mapper = EntityMapper::new(dataset(), MapperOptions::default());
        let mut resolver = XrefResolver::new(dataset());
        let err = mapper.map(&record, &mut resolver).unwrap_err();
        assert!(matches!(err, MappingError::MissingXref { line: 1, .. }));
    }

    #[test]
    fn unknown_tags_and_bad_dates_are_warnings() {
        let record = single(
            "\
0 @I1@ INDI
1 _MILT Served 1861
1 DEAT
2 DATE in the war
",
        );
        let mapper = EntityMapper::new(dataset(), MapperOptions::default());
        let mut resolver = XrefResolver::new(dataset());
        let mapped = mapper.map(&record, &mut resolver).unwrap();

        let codes: Vec<_> = mapped.warnings.iter().map(|w| w.code.as_str()).collect();
        assert_eq!(codes, vec!["unknown_tag", "invalid_date"]);
        assert_eq!(mapped.warnings[0].line, Some(2));
        assert_eq!(mapped.warnings[1].record.as_deref(), Some("@I1@ INDI"));

        let death = mapped
            .drafts
            .iter()
            .find_map(|draft| match draft {
                EntityDraft::Event(event) => Some(event),
                _ => None,
            })
            .unwrap();
        let date = death.date.as_ref().unwrap();
        assert!(!date.is_valid);
        assert_eq!(date.original, "in the war");
    }

    #[test]
    fn citations_attach_to_events_and_respect_source_option() {
        let input = "\
0 @I1@ INDI
1 BIRT
2 DATE 1850
2 SOUR @S1@
3 PAGE p. 12
3 QUAY 3
1 SOUR Family bible
";
        let record = single(input);
        let mapper = EntityMapper::new(dataset(), MapperOptions::default());
        let mut resolver = XrefResolver::new(dataset());
        let mapped = mapper.map(&record, &mut resolver).unwrap();

        let citations: Vec<_> = mapped
            .drafts
            .iter()
            .filter_map(|draft| match draft {
                EntityDraft::Citation(citation) => Some(citation),
                _ => None,
            })
            .collect();
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].source.as_ref().unwrap().as_str(), "S1");
        assert!(matches!(&citations[0].owner, CitationOwner::Event(id) if id.as_str() == "I1.E1"));
        assert_eq!(citations[0].page.as_deref(), Some("p. 12"));
        assert_eq!(citations[0].quality, Some(3));
        assert_eq!(citations[1].source, None);
        assert_eq!(citations[1].text.as_deref(), Some("Family bible"));

        let without_sources = EntityMapper::new(
            dataset(),
            MapperOptions {
                import_sources: false,
                import_media: true,
            },
        );
        let mut resolver = XrefResolver::new(dataset());
        let mapped = without_sources.map(&record, &mut resolver).unwrap();
        assert!(mapped
            .drafts
            .iter()
            .all(|draft| draft.kind() != EntityKind::Citation));
        assert!(!resolver.finish().dangling.iter().any(|d| d.xref == "S1"));
    }

    #[test]
    fn disabled_record_kinds_are_skipped() {
        let mapper = EntityMapper::new(
            dataset(),
            MapperOptions {
                import_sources: false,
                import_media: false,
            },
        );
        let mut resolver = XrefResolver::new(dataset());

        let source = single("0 @S1@ SOUR\n1 TITL Parish register\n");
        let mapped = mapper.map(&source, &mut resolver).unwrap();
        assert_eq!(
            mapped.disposition,
            RecordDisposition::Skipped(SkipReason::SourcesDisabled)
        );
        assert!(mapped.drafts.is_empty());

        let media = single("0 @M1@ OBJE\n1 FILE photo.jpg\n");
        let mapped = mapper.map(&media, &mut resolver).unwrap();
        assert_eq!(
            mapped.disposition,
            RecordDisposition::Skipped(SkipReason::MediaDisabled)
        );
    }

    #[test]
    fn header_reports_metadata_and_charset_warning() {
        let record = single(
            "\
0 HEAD
1 SOUR PAF
2 NAME Personal Ancestral File
1 GEDC
2 VERS 5.5.1
1 CHAR ANSEL
",
        );
        let mapper = EntityMapper::new(dataset(), MapperOptions::default());
        let mut resolver = XrefResolver::new(dataset());
        let mapped = mapper.map(&record, &mut resolver).unwrap();

        let RecordDisposition::Header(header) = mapped.disposition else {
            panic!("header disposition expected");
        };
        assert_eq!(
            header.source_system.as_deref(),
            Some("Personal Ancestral File")
        );
        assert_eq!(header.gedcom_version.as_deref(), Some("5.5.1"));
        assert_eq!(mapped.warnings[0].code, "unsupported_charset");
    }

    #[test]
    fn media_requires_file() {
        let mapper = EntityMapper::new(dataset(), MapperOptions::default());
        let mut resolver = XrefResolver::new(dataset());

        let ok = single("0 @M1@ OBJE\n1 FILE photos/anna.jpg\n2 FORM jpeg\n2 TITL Anna 1901\n");
        let mapped = mapper.map(&ok, &mut resolver).unwrap();
        let EntityDraft::Media(media) = &mapped.drafts[0] else {
            panic!("media draft expected");
        };
        assert_eq!(media.file, "photos/anna.jpg");
        assert_eq!(media.format.as_deref(), Some("jpeg"));
        assert_eq!(media.title.as_deref(), Some("Anna 1901"));

        let missing = single("0 @M2@ OBJE\n1 TITL Untitled\n");
        let err = mapper.map(&missing, &mut resolver).unwrap_err();
        assert_eq!(err.code(), "missing_media_file");
    }

    #[test]
    fn duplicate_definition_is_warned() {
        let mapper = EntityMapper::new(dataset(), MapperOptions::default());
        let mut resolver = XrefResolver::new(dataset());
        let all = records("0 @I1@ INDI\n1 SEX F\n0 @I1@ INDI\n1 SEX M\n");

        mapper.map(&all[0], &mut resolver).unwrap();
        let second = mapper.map(&all[1], &mut resolver).unwrap();
        assert_eq!(second.warnings[0].code, "duplicate_xref");
        assert!(matches!(
            second.disposition,
            RecordDisposition::Entity { ref declaration, .. } if declaration.duplicate_of == Some(1)
        ));
    }

    #[test]
    fn name_sub_tags_override_slash_parsing() {
        let record = single("0 @I1@ INDI\n1 NAME Anna Maria\n2 SURN Berg\n");
        let name = parse_name(record.child("NAME").unwrap());
        assert_eq!(name.given.as_deref(), Some("Anna Maria"));
        assert_eq!(name.surname.as_deref(), Some("Berg"));
        assert_eq!(name.display.as_deref(), Some("Anna Maria Berg"));
    }
}
