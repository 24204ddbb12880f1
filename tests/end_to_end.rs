use std::io::Write;
use std::sync::{Arc, Once};

use dirfilter::{
    AliasDerefMode, Candidate, DirError, Dn, Entry, EntryId, EvaluatorBuilder, EvaluatorConfig,
    FilterNode, MemStore, Result, SchemaRegistry, Store,
};
use tempfile::NamedTempFile;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("dirfilter=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_ansi(false)
            .try_init();
    });
}

struct Directory {
    registry: Arc<SchemaRegistry>,
    store: Arc<MemStore>,
    suffix: EntryId,
}

impl Directory {
    fn new() -> Result<Self> {
        init_tracing();
        let registry = Arc::new(SchemaRegistry::with_core_schema());
        let store = Arc::new(MemStore::new());
        let oc = registry.lookup("objectClass")?;
        let dc = registry.lookup("dc")?;
        let suffix = store.add(
            Entry::new(Dn::parse("dc=example")?)
                .with(&oc, ["top", "domain"])
                .with(&dc, ["example"]),
        )?;
        Ok(Self {
            registry,
            store,
            suffix,
        })
    }

    fn add(&self, dn: &str, attrs: &[(&str, &[&str])]) -> Result<EntryId> {
        let mut entry = Entry::new(Dn::parse(dn)?);
        for (name, values) in attrs {
            let at = self.registry.lookup(name)?;
            entry.add(&at, values.iter().copied());
        }
        self.store.add(entry)
    }

    fn builder(&self, config: EvaluatorConfig) -> EvaluatorBuilder<MemStore> {
        EvaluatorBuilder::new(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            config,
        )
    }
}

fn person_named_bob() -> FilterNode {
    FilterNode::and(vec![
        FilterNode::equality("objectClass", "person"),
        FilterNode::equality("cn", "bob"),
    ])
}

#[test]
fn conjunction_under_suffix_scope() -> Result<()> {
    let dir = Directory::new()?;
    let e1 = dir.add(
        "cn=bob,dc=example",
        &[("objectClass", &["top", "person"]), ("cn", &["bob"])],
    )?;
    let e2 = dir.add(
        "cn=alice,dc=example",
        &[("objectClass", &["top", "person"]), ("cn", &["alice"])],
    )?;
    let e3 = dir.add(
        "cn=bob-group,dc=example",
        &[("objectClass", &["groupOfNames"]), ("cn", &["bob"])],
    )?;

    let filter = FilterNode::and(vec![
        FilterNode::subtree(
            dir.suffix,
            Dn::parse("dc=example")?,
            AliasDerefMode::NeverDerefAliases,
        ),
        person_named_bob(),
    ]);
    let tx = dir.store.begin_read();
    let eval = dir.builder(EvaluatorConfig::default()).build(&filter, &tx)?;

    assert!(eval.evaluate(&mut Candidate::new(e1), &tx)?.matched());
    assert!(!eval.evaluate(&mut Candidate::new(e2), &tx)?.matched());
    assert!(!eval.evaluate(&mut Candidate::new(e3), &tx)?.matched());
    Ok(())
}

#[test]
fn deleted_candidate_is_a_non_match() -> Result<()> {
    let dir = Directory::new()?;
    let e1 = dir.add(
        "cn=bob,dc=example",
        &[("objectClass", &["top", "person"]), ("cn", &["bob"])],
    )?;
    let eval = dir
        .builder(EvaluatorConfig::default())
        .build(&person_named_bob(), &dir.store.begin_read())?;

    assert!(dir.store.delete(e1)?);
    let tx = dir.store.begin_read();
    assert!(!eval.evaluate(&mut Candidate::new(e1), &tx)?.matched());
    Ok(())
}

#[test]
fn candidate_and_entry_modes_agree() -> Result<()> {
    let dir = Directory::new()?;
    let ids = [
        dir.add(
            "cn=Bob Smith,dc=example",
            &[
                ("objectClass", &["top", "person"]),
                ("cn", &["Bob Smith"]),
                ("mail", &["bob@example.com"]),
                ("uidNumber", &["1001"]),
            ],
        )?,
        dir.add(
            "cn=Carol,dc=example",
            &[
                ("objectClass", &["top", "person"]),
                ("cn", &["Carol"]),
                ("uidNumber", &["42"]),
            ],
        )?,
        dir.add("ou=people,dc=example", &[("ou", &["people"])])?,
    ];
    let filters = [
        FilterNode::or(vec![
            FilterNode::substring("cn", Some("bob"), &[], None),
            FilterNode::greater_eq("uidNumber", "1000"),
        ]),
        FilterNode::and(vec![
            FilterNode::present("mail"),
            FilterNode::less_eq("uidNumber", "2000"),
        ]),
        FilterNode::not(FilterNode::present("uidNumber")),
        FilterNode::approximate("cn", "  CAROL "),
        FilterNode::equality("name", "people"),
    ];

    let tx = dir.store.begin_read();
    let builder = dir.builder(EvaluatorConfig::default());
    for filter in &filters {
        let eval = builder.build(filter, &tx)?;
        for id in ids {
            let entry = dir.store.fetch(&tx, id)?.expect("entry exists");
            let by_id = eval.evaluate(&mut Candidate::new(id), &tx)?.matched();
            let by_entry = eval.evaluate_entry(&entry)?;
            assert_eq!(by_id, by_entry, "{filter} on {}", entry.dn());
        }
    }
    Ok(())
}

#[test]
fn supertype_filter_matches_subtype_values() -> Result<()> {
    let dir = Directory::new()?;
    let bob = dir.add("cn=bob,dc=example", &[("cn", &["bob"]), ("sn", &["Smith"])])?;
    let tx = dir.store.begin_read();
    let builder = dir.builder(EvaluatorConfig::default());

    let by_name = builder.build(&FilterNode::equality("name", "SMITH"), &tx)?;
    assert!(by_name.evaluate(&mut Candidate::new(bob), &tx)?.matched());

    let by_surname = builder.build(&FilterNode::equality("surname", "bob"), &tx)?;
    assert!(!by_surname.evaluate(&mut Candidate::new(bob), &tx)?.matched());
    Ok(())
}

#[test]
fn ordering_reports_the_matching_value() -> Result<()> {
    let dir = Directory::new()?;
    let id = dir.add("cn=svc,dc=example", &[("uidNumber", &["7", "700"])])?;
    let tx = dir.store.begin_read();
    let eval = dir
        .builder(EvaluatorConfig::default())
        .build(&FilterNode::greater_eq("uidNumber", "100"), &tx)?;
    let outcome = eval.evaluate(&mut Candidate::new(id), &tx)?;
    assert!(outcome.matched());
    assert_eq!(outcome.value().and_then(|v| v.as_str()), Some("700"));
    Ok(())
}

#[test]
fn scoped_ordering_still_reports_the_matching_value() -> Result<()> {
    let dir = Directory::new()?;
    let id = dir.add("cn=svc,dc=example", &[("uidNumber", &["7", "700"])])?;
    let tx = dir.store.begin_read();
    let builder = dir.builder(EvaluatorConfig::default());

    let scoped = builder.build(
        &FilterNode::and(vec![
            FilterNode::subtree(
                dir.suffix,
                Dn::parse("dc=example")?,
                AliasDerefMode::NeverDerefAliases,
            ),
            FilterNode::greater_eq("uidNumber", "100"),
        ]),
        &tx,
    )?;
    let outcome = scoped.evaluate(&mut Candidate::new(id), &tx)?;
    assert!(outcome.matched());
    assert_eq!(outcome.value().and_then(|v| v.as_str()), Some("700"));

    let either = builder.build(
        &FilterNode::or(vec![
            FilterNode::equality("cn", "nobody"),
            FilterNode::greater_eq("uidNumber", "100"),
        ]),
        &tx,
    )?;
    let outcome = either.evaluate(&mut Candidate::new(id), &tx)?;
    assert_eq!(outcome.value().and_then(|v| v.as_str()), Some("700"));
    Ok(())
}

#[test]
fn construction_errors_surface_before_evaluation() -> Result<()> {
    let dir = Directory::new()?;
    let tx = dir.store.begin_read();
    let builder = dir.builder(EvaluatorConfig::default());

    let unknown = builder.build(&FilterNode::equality("shoeSize", "42"), &tx);
    assert!(matches!(unknown, Err(DirError::UnknownAttribute(_))));

    let no_ordering = builder.build(&FilterNode::less_eq("jpegPhoto", "x"), &tx);
    assert!(matches!(no_ordering, Err(ref err) if err.is_construction_error()));

    let bad_integer = builder.build(&FilterNode::equality("uidNumber", "forty"), &tx);
    assert!(matches!(bad_integer, Err(DirError::InvalidValue { .. })));
    Ok(())
}

#[test]
fn config_file_controls_substring_gaps() -> Result<()> {
    let dir = Directory::new()?;
    let id = dir.add("cn=abcd,dc=example", &[("cn", &["abcd"])])?;

    let mut file = NamedTempFile::new()?;
    writeln!(file, "allow_empty_substring_gaps = true")?;
    let lenient = EvaluatorConfig::load(file.path())?;

    let filter = FilterNode::substring("cn", Some("ab"), &["cd"], None);
    let tx = dir.store.begin_read();
    let strict_eval = dir.builder(EvaluatorConfig::strict()).build(&filter, &tx)?;
    let lenient_eval = dir.builder(lenient).build(&filter, &tx)?;
    assert!(!strict_eval.evaluate(&mut Candidate::new(id), &tx)?.matched());
    assert!(lenient_eval.evaluate(&mut Candidate::new(id), &tx)?.matched());
    Ok(())
}

#[test]
fn indexed_attributes_drive_conjunction_order() -> Result<()> {
    let dir = Directory::new()?;
    for i in 0..20 {
        let uid = format!("u{i}");
        dir.add(
            &format!("uid={uid},dc=example"),
            &[("objectClass", &["top", "person"]), ("uid", &[uid.as_str()])],
        )?;
    }
    dir.add("uid=special,dc=example", &[("uid", &["special"]), ("mail", &["s@example.com"])])?;
    dir.store.create_index(&*dir.registry.lookup("mail")?);
    dir.store.create_index(&*dir.registry.lookup("objectClass")?);

    let tx = dir.store.begin_read();
    let eval = dir.builder(EvaluatorConfig::default()).build(
        &FilterNode::and(vec![
            FilterNode::equality("objectClass", "person"),
            FilterNode::present("mail"),
        ]),
        &tx,
    )?;
    let order: Vec<_> = eval
        .children()
        .iter()
        .map(|child| child.expression().kind())
        .collect();
    assert_eq!(order, ["Presence", "Equality"]);
    Ok(())
}
