use std::sync::Arc;

use dirfilter::{
    AliasCache, AliasDerefMode, Candidate, Dn, Entry, EntryId, Evaluator, EvaluatorBuilder,
    EvaluatorConfig, FilterNode, MemStore, Result, SchemaRegistry,
};

struct Tree {
    registry: Arc<SchemaRegistry>,
    store: Arc<MemStore>,
    suffix: EntryId,
}

impl Tree {
    fn new(store: MemStore) -> Result<Self> {
        let registry = Arc::new(SchemaRegistry::with_core_schema());
        let dc = registry.lookup("dc")?;
        let suffix = store.add(Entry::new(Dn::parse("dc=example")?).with(&dc, ["example"]))?;
        Ok(Self {
            registry,
            store: Arc::new(store),
            suffix,
        })
    }

    fn add(&self, dn: &str, attrs: &[(&str, &[&str])]) -> Result<EntryId> {
        let mut entry = Entry::new(Dn::parse(dn)?);
        for (name, values) in attrs {
            entry.add(&*self.registry.lookup(name)?, values.iter().copied());
        }
        self.store.add(entry)
    }

    fn ou(&self, dn: &str) -> Result<EntryId> {
        let value = dn
            .split(',')
            .next()
            .and_then(|rdn| rdn.strip_prefix("ou="))
            .unwrap_or(dn);
        self.add(dn, &[("ou", &[value])])
    }

    fn scope(
        &self,
        base: EntryId,
        base_dn: &str,
        deref: AliasDerefMode,
    ) -> Result<Box<dyn Evaluator<MemStore>>> {
        let builder = EvaluatorBuilder::new(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            EvaluatorConfig::default(),
        );
        builder.build(
            &FilterNode::subtree(base, Dn::parse(base_dn)?, deref),
            &self.store.begin_read(),
        )
    }

    fn in_scope(&self, eval: &dyn Evaluator<MemStore>, id: EntryId) -> Result<bool> {
        let tx = self.store.begin_read();
        Ok(eval.evaluate(&mut Candidate::new(id), &tx)?.matched())
    }
}

#[test]
fn suffix_scope_accepts_every_depth() -> Result<()> {
    let tree = Tree::new(MemStore::new())?;
    let mut ids = vec![tree.suffix];
    let mut dn = String::from("dc=example");
    for level in 0..8 {
        dn = format!("ou=l{level},{dn}");
        ids.push(tree.ou(&dn)?);
    }
    let eval = tree.scope(tree.suffix, "dc=example", AliasDerefMode::NeverDerefAliases)?;
    for id in ids {
        assert!(tree.in_scope(&*eval, id)?, "{id} should be in scope");
    }
    Ok(())
}

#[test]
fn nested_base_limits_the_subtree() -> Result<()> {
    let tree = Tree::new(MemStore::new())?;
    let eng = tree.ou("ou=eng,dc=example")?;
    let sales = tree.ou("ou=sales,dc=example")?;
    let team = tree.ou("ou=team,ou=eng,dc=example")?;
    let dev = tree.add("cn=dev,ou=team,ou=eng,dc=example", &[("cn", &["dev"])])?;
    let rep = tree.add("cn=rep,ou=sales,dc=example", &[("cn", &["rep"])])?;

    let eval = tree.scope(eng, "ou=eng,dc=example", AliasDerefMode::NeverDerefAliases)?;
    assert!(tree.in_scope(&*eval, eng)?);
    assert!(tree.in_scope(&*eval, team)?);
    assert!(tree.in_scope(&*eval, dev)?);
    assert!(!tree.in_scope(&*eval, sales)?);
    assert!(!tree.in_scope(&*eval, rep)?);
    assert!(!tree.in_scope(&*eval, tree.suffix)?);
    Ok(())
}

#[test]
fn dereferencing_search_swaps_aliases_for_their_targets() -> Result<()> {
    let tree = Tree::new(MemStore::new())?;
    let people = tree.ou("ou=people,dc=example")?;
    tree.ou("ou=contractors,dc=example")?;
    let bob = tree.add("cn=bob,ou=people,dc=example", &[("cn", &["bob"])])?;
    let zed = tree.add("cn=zed,ou=contractors,dc=example", &[("cn", &["zed"])])?;
    let pointer = tree.add(
        "cn=zed,ou=people,dc=example",
        &[
            ("objectClass", &["top", "alias", "extensibleObject"]),
            ("cn", &["zed"]),
            ("aliasedObjectName", &["cn=zed,ou=contractors,dc=example"]),
        ],
    )?;
    tree.store.add_sub_alias(people, zed);

    let plain = tree.scope(people, "ou=people,dc=example", AliasDerefMode::NeverDerefAliases)?;
    assert!(tree.in_scope(&*plain, pointer)?);
    assert!(!tree.in_scope(&*plain, zed)?);

    for mode in [AliasDerefMode::DerefInSearching, AliasDerefMode::DerefAlways] {
        let deref = tree.scope(people, "ou=people,dc=example", mode)?;
        assert!(!tree.in_scope(&*deref, pointer)?, "{mode} keeps the alias");
        assert!(tree.in_scope(&*deref, bob)?);
        assert!(tree.in_scope(&*deref, zed)?, "{mode} misses the alias target");
    }
    Ok(())
}

#[test]
fn alias_base_suffix_still_excludes_aliases_when_dereferencing() -> Result<()> {
    let tree = Tree::new(MemStore::new())?;
    let target = tree.ou("ou=target,dc=example")?;
    let link = tree.add(
        "cn=link,dc=example",
        &[
            ("objectClass", &["alias"]),
            ("aliasedObjectName", &["ou=target,dc=example"]),
        ],
    )?;
    let eval = tree.scope(tree.suffix, "dc=example", AliasDerefMode::DerefInSearching)?;
    assert!(tree.in_scope(&*eval, target)?);
    assert!(!tree.in_scope(&*eval, link)?);
    Ok(())
}

#[test]
fn works_without_an_alias_cache() -> Result<()> {
    let tree = Tree::new(MemStore::new().with_alias_cache(None))?;
    let people = tree.ou("ou=people,dc=example")?;
    let bob = tree.add("cn=bob,ou=people,dc=example", &[("cn", &["bob"])])?;
    let eval = tree.scope(people, "ou=people,dc=example", AliasDerefMode::DerefAlways)?;
    assert!(tree.in_scope(&*eval, bob)?);
    Ok(())
}

#[test]
fn cached_alias_flags_follow_store_writes() -> Result<()> {
    let tree = Tree::new(MemStore::new().with_alias_cache(Some(AliasCache::new(16))))?;
    let people = tree.ou("ou=people,dc=example")?;
    let bob = tree.add("cn=bob,ou=people,dc=example", &[("cn", &["bob"])])?;
    let eval = tree.scope(people, "ou=people,dc=example", AliasDerefMode::DerefInSearching)?;
    assert!(tree.in_scope(&*eval, bob)?);

    tree.store.mark_alias(bob, Dn::parse("ou=people,dc=example")?)?;
    assert!(!tree.in_scope(&*eval, bob)?);
    Ok(())
}

#[test]
fn cached_alias_flags_stay_with_their_snapshot() -> Result<()> {
    let tree = Tree::new(MemStore::new().with_alias_cache(Some(AliasCache::new(16))))?;
    let people = tree.ou("ou=people,dc=example")?;
    let bob = tree.add("cn=bob,ou=people,dc=example", &[("cn", &["bob"])])?;
    let eval = tree.scope(people, "ou=people,dc=example", AliasDerefMode::DerefInSearching)?;

    let before = tree.store.begin_read();
    assert!(eval.evaluate(&mut Candidate::new(bob), &before)?.matched());
    tree.store.mark_alias(bob, Dn::parse("ou=people,dc=example")?)?;
    let after = tree.store.begin_read();

    // alternate so each read finds the other snapshot's answer in the cache
    for _ in 0..2 {
        assert!(!eval.evaluate(&mut Candidate::new(bob), &after)?.matched());
        assert!(eval.evaluate(&mut Candidate::new(bob), &before)?.matched());
    }
    Ok(())
}

#[test]
fn one_evaluator_serves_concurrent_readers() -> Result<()> {
    let tree = Tree::new(MemStore::new())?;
    let people = tree.ou("ou=people,dc=example")?;
    let mut members = Vec::new();
    for i in 0..32 {
        members.push(tree.add(&format!("cn=p{i},ou=people,dc=example"), &[("cn", &["p"])])?);
    }
    let outsider = tree.ou("ou=elsewhere,dc=example")?;
    let eval = tree.scope(people, "ou=people,dc=example", AliasDerefMode::DerefAlways)?;

    std::thread::scope(|s| {
        for chunk in members.chunks(8) {
            let eval = &eval;
            let store = &tree.store;
            s.spawn(move || {
                let tx = store.begin_read();
                for &id in chunk {
                    assert!(eval.evaluate(&mut Candidate::new(id), &tx).unwrap().matched());
                }
                assert!(!eval
                    .evaluate(&mut Candidate::new(outsider), &tx)
                    .unwrap()
                    .matched());
            });
        }
    });
    Ok(())
}
