use gedimport_core::{
    DatasetId, EntityDraft, EntityKind, ImportCoordinator, ImportOptions, ImportRun,
    MemoryAuditLog, MemoryImportStore, RunStatus, Severity,
};
use std::io::Cursor;

const FIVE_PERSONS_THIRD_BROKEN: &str = "\
0 HEAD
1 CHAR UTF-8
0 @I1@ INDI
1 NAME Ada /One/
0 @I2@ INDI
1 NAME Ben /Two/
0 INDI
1 NAME Cy /Three/
0 @I4@ INDI
1 NAME Di /Four/
0 @I5@ INDI
1 NAME Ed /Five/
0 TRLR
";

fn dataset() -> DatasetId {
    DatasetId::parse("tree").unwrap()
}

fn import(store: &mut MemoryImportStore, input: &str, options: ImportOptions) -> ImportRun {
    let mut audit = MemoryAuditLog::new();
    ImportCoordinator::new(store, &mut audit, options).run(
        Cursor::new(input.as_bytes().to_vec()),
        dataset(),
        "input.ged",
    )
}

#[test]
fn strict_mode_rolls_back_everything_on_first_mapping_error() {
    let mut store = MemoryImportStore::new();
    let run = import(&mut store, FIVE_PERSONS_THIRD_BROKEN, ImportOptions::default());

    assert_eq!(run.status, RunStatus::RolledBack);
    assert!(run.completed_at.is_some());
    assert_eq!(store.count(&dataset(), EntityKind::Person), 0);
    assert_eq!(run.count(EntityKind::Person), 0);

    let fatal: Vec<_> = run
        .errors
        .iter()
        .filter(|e| e.severity == Severity::Fatal)
        .collect();
    assert_eq!(fatal.len(), 1);
    assert_eq!(fatal[0].code, "missing_xref");
    assert_eq!(fatal[0].line, Some(7));
}

#[test]
fn tolerant_mode_drops_only_the_broken_record() {
    let mut store = MemoryImportStore::new();
    let run = import(&mut store, FIVE_PERSONS_THIRD_BROKEN, ImportOptions::tolerant());

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.count(EntityKind::Person), 4);
    assert_eq!(store.count(&dataset(), EntityKind::Person), 4);
    assert_eq!(run.records_skipped, 1);

    let errors: Vec<_> = run
        .errors
        .iter()
        .filter(|e| e.severity == Severity::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line, Some(7));
    assert_eq!(errors[0].record.as_deref(), Some("INDI"));
    assert!(!run.has_fatal());
}

#[test]
fn family_before_its_members_resolves_forward_references() {
    let input = "\
0 @F1@ FAM
1 HUSB @I1@
1 CHIL @I2@
0 @I1@ INDI
1 NAME Tom /Hale/
1 FAMS @F1@
0 @I2@ INDI
1 NAME Sue /Hale/
1 FAMC @F1@
2 PEDI birth
0 TRLR
";
    let mut store = MemoryImportStore::new();
    let run = import(&mut store, input, ImportOptions::default());

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.error_count(Severity::Dangling), 0);
    assert_eq!(run.count(EntityKind::ChildLink), 1);

    let links = store.child_links(&dataset());
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].family.as_str(), "F1");
    assert_eq!(links[0].child.as_str(), "I2");
    assert_eq!(links[0].sequence, Some(1));
    assert!(store.get(&dataset(), EntityKind::Person, "I2").is_some());
}

#[test]
fn malformed_line_is_a_warning_and_parsing_continues() {
    let input = "0 @I1@ INDI\n1\n1 NAME Lea /Frost/\n0 TRLR\n";
    let mut store = MemoryImportStore::new();
    let run = import(&mut store, input, ImportOptions::default());

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.errors.len(), 1);
    assert_eq!(run.errors[0].severity, Severity::Warning);
    assert_eq!(run.errors[0].code, "malformed_line");
    assert_eq!(run.errors[0].line, Some(2));

    let persons = store.persons(&dataset());
    assert_eq!(persons.len(), 1);
    assert_eq!(persons[0].surname.as_deref(), Some("Frost"));
}

#[test]
fn record_after_trailer_is_still_imported_with_warning() {
    let input = "0 TRLR\n0 @I1@ INDI\n1 NAME Late /Comer/\n";
    let mut store = MemoryImportStore::new();
    let run = import(&mut store, input, ImportOptions::default());

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.errors[0].code, "record_after_trailer");
    assert_eq!(run.count(EntityKind::Person), 1);
}

#[test]
fn disabled_sources_skip_records_and_citations() {
    let input = "\
0 @S1@ SOUR
1 TITL Census 1900
0 @I1@ INDI
1 BIRT
2 DATE 1899
2 SOUR @S1@
3 PAGE sheet 4
0 TRLR
";
    let mut store = MemoryImportStore::new();
    let options = ImportOptions {
        import_sources: false,
        ..ImportOptions::default()
    };
    let run = import(&mut store, input, options);

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.count(EntityKind::Source), 0);
    assert_eq!(run.count(EntityKind::Citation), 0);
    assert_eq!(run.count(EntityKind::Event), 1);
    assert_eq!(run.records_skipped, 1);
    assert_eq!(run.error_count(Severity::Dangling), 0);
}

#[test]
fn kind_mismatch_is_reported_as_dangling() {
    let input = "\
0 @I1@ INDI
1 FAMC @I2@
0 @I2@ INDI
1 NAME Not /AFamily/
0 TRLR
";
    let mut store = MemoryImportStore::new();
    let run = import(&mut store, input, ImportOptions::default());

    assert_eq!(run.status, RunStatus::Completed);
    let mismatch = run
        .errors
        .iter()
        .find(|e| e.code == "kind_mismatch")
        .expect("kind mismatch reported");
    assert_eq!(mismatch.severity, Severity::Dangling);
    assert_eq!(mismatch.line, Some(2));
}

const PERSON_REDEFINED: &str = "\
0 @F1@ FAM
1 HUSB @I2@
0 @I1@ INDI
1 NAME Old /Vale/
1 BIRT
2 DATE 1 JAN 1800
1 DEAT
2 DATE 1 JAN 1850
1 FAMC @F1@
0 @I2@ INDI
1 NAME Abe /Vale/
1 FAMS @F1@
0 @I1@ INDI
1 NAME New /Vale/
1 BIRT
2 DATE 2 FEB 1801
0 TRLR
";

#[test]
fn redefined_record_replaces_everything_the_first_definition_wrote() {
    let mut store = MemoryImportStore::new();
    let run = import(&mut store, PERSON_REDEFINED, ImportOptions::default());

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        run.errors.iter().filter(|e| e.code == "duplicate_xref").count(),
        1
    );

    assert_eq!(run.count(EntityKind::Person), 2);
    assert_eq!(run.count(EntityKind::Event), 1);
    assert_eq!(run.count(EntityKind::ChildLink), 0);
    assert_eq!(store.count(&dataset(), EntityKind::Person), 2);
    assert_eq!(store.count(&dataset(), EntityKind::Event), 1);
    assert_eq!(store.count(&dataset(), EntityKind::ChildLink), 0);

    let Some(EntityDraft::Event(birth)) = store.get(&dataset(), EntityKind::Event, "I1.E1") else {
        panic!("birth event missing");
    };
    assert_eq!(birth.date.as_ref().and_then(|date| date.year), Some(1801));
    assert!(store.get(&dataset(), EntityKind::Event, "I1.E2").is_none());
}

#[test]
fn redefined_person_keeps_link_its_family_still_names() {
    let input = "\
0 @I1@ INDI
1 FAMC @F1@
2 PEDI adopted
0 @F1@ FAM
1 CHIL @I1@
0 @I1@ INDI
1 NAME Kit /Rowe/
0 TRLR
";
    let mut store = MemoryImportStore::new();
    let run = import(&mut store, input, ImportOptions::default());

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.count(EntityKind::ChildLink), 1);
    let links = store.child_links(&dataset());
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].sequence, Some(1));
}

#[test]
fn xrefs_containing_colons_keep_distinct_child_links() {
    let input = "\
0 @F1@ FAM
1 CHIL @I3:X@
0 @F1:I3@ FAM
1 CHIL @X@
0 @I3:X@ INDI
0 @X@ INDI
0 TRLR
";
    let mut store = MemoryImportStore::new();
    let run = import(&mut store, input, ImportOptions::default());

    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.errors.is_empty());
    assert_eq!(run.count(EntityKind::ChildLink), 2);

    let mut pairs: Vec<_> = store
        .child_links(&dataset())
        .iter()
        .map(|link| (link.family.to_string(), link.child.to_string()))
        .collect();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![
            ("F1".to_string(), "I3:X".to_string()),
            ("F1:I3".to_string(), "X".to_string()),
        ]
    );
}
