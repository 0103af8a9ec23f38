//! End-to-end pipeline scenarios over the public archive interface: raw XML
//! in, versions, search results, and reference edges out.

use chrono::NaiveDate;
use lawarchive::model::IncludeDirective;
use lawarchive::{
    Archive, ArchiveError, CancelFlag, ChangeKind, Config, DocNode, Direction, IngestOptions,
    NodeKind, RawDocument, ResolutionState, SearchFilters, SourceGraph,
};

fn open_archive(dir: &tempfile::TempDir) -> Archive {
    let mut config = Config::default();
    config.storage.db_path = dir.path().join("archive.db");
    Archive::open(config).expect("archive opens")
}

fn uslm_section(section: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<uscDoc xmlns="http://xml.house.gov/schemas/uslm/1.0">
  <main>
    <title identifier="/us/usc/t26">
      <heading>Internal Revenue Code</heading>
      <section identifier="/us/usc/t26/s{section}">
        <num value="{section}">{section}.</num>
        <heading>Sample provision</heading>
        {body}
      </section>
    </title>
  </main>
</uscDoc>"#
    )
}

fn raw(xml: &str, url: &str) -> RawDocument {
    RawDocument::new(xml.as_bytes().to_vec(), url)
}

#[tokio::test]
async fn idempotent_reingestion_keeps_one_version() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open_archive(&dir);

    let xml = uslm_section(
        "32",
        r#"<subsection><num value="a">(a)</num><content>A credit is allowed.</content></subsection>"#,
    );
    let first = archive.ingest(&raw(&xml, "https://x/32")).await.unwrap();
    assert_eq!(first.change, ChangeKind::Created);

    let second = archive.ingest(&raw(&xml, "https://x/32")).await.unwrap();
    assert_eq!(second.change, ChangeKind::Unchanged);
    assert_eq!(second.version.id, first.version.id);
    assert_eq!(archive.stats().total_versions, 1);
}

#[tokio::test]
async fn amendment_chains_and_point_in_time_retrieval() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open_archive(&dir);
    let graph = SourceGraph::new();

    let v1_xml = uslm_section(
        "32",
        r#"<subsection><num value="a">(a)</num><content>The credit is 30 percent.</content></subsection>"#,
    );
    let v1 = archive
        .ingest_with_options(
            &raw(&v1_xml, "https://x/32"),
            &graph,
            IngestOptions {
                effective_date: NaiveDate::from_ymd_opt(2020, 1, 1),
                correction: false,
            },
        )
        .await
        .unwrap();

    let v2_xml = uslm_section(
        "32",
        r#"<subsection><num value="a">(a)</num><content>The credit is 34 percent.</content></subsection>"#,
    );
    let v2 = archive
        .ingest_with_options(
            &raw(&v2_xml, "https://x/32"),
            &graph,
            IngestOptions {
                effective_date: NaiveDate::from_ymd_opt(2022, 1, 1),
                correction: false,
            },
        )
        .await
        .unwrap();

    assert_eq!(v2.change, ChangeKind::Amended);
    assert_eq!(v2.version.parent, Some(v1.version.id));
    assert_eq!(v2.version.sequence, 2);

    // A date between the two effective dates returns the earlier version.
    let between = NaiveDate::from_ymd_opt(2021, 6, 30);
    let fetched = archive.get("26 USC 32", between).await.unwrap().unwrap();
    assert_eq!(fetched.id, v1.version.id);

    // The as-of suffix in citation text works the same way.
    let fetched = archive
        .get("26 USC 32 @2021-06-30", None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.id, v1.version.id);

    // Without a date, the latest version wins.
    let latest = archive.get("26 USC 32", None).await.unwrap().unwrap();
    assert_eq!(latest.id, v2.version.id);

    // Dates before the first version find nothing.
    let early = NaiveDate::from_ymd_opt(2019, 1, 1);
    assert!(archive.get("26 USC 32", early).await.unwrap().is_none());
}

#[tokio::test]
async fn circular_transclusion_commits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open_archive(&dir);

    let dc_xml = r#"<?xml version="1.0" encoding="utf-8"?>
<section xmlns="https://code.dccouncil.us/schemas/dc-library"
         xmlns:xi="http://www.w3.org/2001/XInclude">
  <num>4-205.11</num>
  <heading>Eligibility standards.</heading>
  <xi:include href="./a.xml"/>
</section>"#;

    // a includes b, b includes a.
    let mut graph = SourceGraph::new();
    let mut frag_a = DocNode::section(Some("a".to_string()), None);
    frag_a
        .children
        .push(DocNode::unresolved_include(IncludeDirective {
            file: "b.xml".to_string(),
            fragment: None,
        }));
    let mut frag_b = DocNode::section(Some("b".to_string()), None);
    frag_b
        .children
        .push(DocNode::unresolved_include(IncludeDirective {
            file: "a.xml".to_string(),
            fragment: None,
        }));
    graph.register("a.xml", None, frag_a);
    graph.register("b.xml", None, frag_b);

    let err = archive
        .ingest_with_sources(&raw(dc_xml, "https://x/4-205.11"), &graph)
        .await
        .unwrap_err();
    assert!(matches!(err, ArchiveError::CircularInclude { .. }));

    // Nothing was committed for the failed document.
    assert!(archive.get("DC 4-205.11", None).await.unwrap().is_none());
    assert_eq!(archive.stats().total_versions, 0);
}

#[tokio::test]
async fn missing_include_ingests_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open_archive(&dir);

    let dc_xml = r#"<?xml version="1.0" encoding="utf-8"?>
<section xmlns="https://code.dccouncil.us/schemas/dc-library"
         xmlns:xi="http://www.w3.org/2001/XInclude">
  <num>4-205.11</num>
  <heading>Eligibility standards.</heading>
  <para><num>(a)</num><text>Standards shall be established by the Mayor.</text></para>
  <xi:include href="./missing.xml"/>
</section>"#;

    let outcome = archive
        .ingest_with_sources(&raw(dc_xml, "https://x/4-205.11"), &SourceGraph::new())
        .await
        .unwrap();
    assert_eq!(outcome.change, ChangeKind::Created);
    assert_eq!(outcome.include_warnings.len(), 1);
    assert_eq!(outcome.include_warnings[0].directive.file, "missing.xml");

    // Most of the document still ingested.
    let version = archive.get("DC 4-205.11", None).await.unwrap().unwrap();
    assert!(version.root.collect_text().contains("established by the Mayor"));
}

#[tokio::test]
async fn nested_table_survives_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open_archive(&dir);

    let xml = uslm_section(
        "32",
        r#"<subsection><num value="b">(b)</num>
             <paragraph><num value="2">(2)</num>
               <subparagraph><num value="A">(A)</num>
                 <content>The credit is determined under the following table:
                   <table>
                     <tr><td>Earned income</td><td>Credit percentage</td></tr>
                     <tr><td>Not over $7,000</td><td>34 percent</td></tr>
                   </table>
                 </content>
               </subparagraph>
             </paragraph>
           </subsection>"#,
    );
    archive.ingest(&raw(&xml, "https://x/32")).await.unwrap();

    let version = archive.get("26 USC 32", None).await.unwrap().unwrap();
    let leaf = version
        .root
        .walk()
        .into_iter()
        .find(|n| n.id.as_str() == "us/statute/26/32/b/2/A")
        .expect("leaf at (b)(2)(A)");
    assert_eq!(leaf.kind, NodeKind::Leaf);
    assert_eq!(leaf.table.as_ref().unwrap().rows.len(), 2);
}

#[tokio::test]
async fn unresolved_reference_flips_after_target_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open_archive(&dir);

    let citing = uslm_section(
        "32",
        r#"<subsection><num value="c">(c)</num>
             <content>A qualifying child under 26 USC 152 is taken into account.</content>
           </subsection>"#,
    );
    archive.ingest(&raw(&citing, "https://x/32")).await.unwrap();

    let outgoing = archive
        .cross_references("26 USC 32", Direction::Outgoing)
        .await
        .unwrap();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].state, ResolutionState::Unresolved);
    assert_eq!(outgoing[0].span_text, "26 USC 152");

    let target = uslm_section(
        "152",
        r#"<subsection><num value="a">(a)</num><content>Dependent defined.</content></subsection>"#,
    );
    archive.ingest(&raw(&target, "https://x/152")).await.unwrap();

    let outgoing = archive
        .cross_references("26 USC 32", Direction::Outgoing)
        .await
        .unwrap();
    match &outgoing[0].state {
        ResolutionState::ResolvedInternal { target_node } => {
            assert_eq!(target_node.as_str(), "us/statute/26/152");
        }
        other => panic!("expected resolved-internal, got {:?}", other),
    }
}

#[tokio::test]
async fn incoming_edges_collect_across_citing_sections() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open_archive(&dir);

    let s32 = uslm_section(
        "32",
        r#"<subsection><num value="c">(c)</num><content>See 26 USC 152 for the definition.</content></subsection>"#,
    );
    let s24 = uslm_section(
        "24",
        r#"<subsection><num value="a">(a)</num><content>Dependent has the meaning in 26 USC 152.</content></subsection>"#,
    );
    let report = archive
        .ingest_batch(
            vec![raw(&s32, "https://x/32"), raw(&s24, "https://x/24")],
            &SourceGraph::new(),
            &CancelFlag::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.created, 2);
    assert_eq!(report.failed, 0);

    let incoming = archive
        .cross_references("26 USC 152", Direction::Incoming)
        .await
        .unwrap();
    assert_eq!(incoming.len(), 2);
}

#[tokio::test]
async fn search_ranks_matching_jurisdiction_document() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open_archive(&dir);

    let dc_xml = r#"<?xml version="1.0" encoding="utf-8"?>
<section xmlns="https://code.dccouncil.us/schemas/dc-library">
  <num>47-1806.03</num>
  <heading>Tax on residents and nonresidents; rates.</heading>
  <para><num>(a)</num>
    <text>There is imposed on the taxable income of every resident a tax on residents.</text>
  </para>
</section>"#;
    archive
        .ingest(&raw(dc_xml, "https://x/47-1806.03"))
        .await
        .unwrap();

    let unrelated = uslm_section(
        "32",
        r#"<subsection><num value="a">(a)</num><content>An earned income credit is allowed.</content></subsection>"#,
    );
    archive.ingest(&raw(&unrelated, "https://x/32")).await.unwrap();

    let hits = archive
        .search(
            "tax on residents",
            SearchFilters {
                jurisdiction: Some("us-dc".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].version.citation.to_string(), "DC 47-1806.03");
    assert!(hits[0].score > 0.0);

    // Unfiltered, the DC section still outranks the unrelated one.
    let hits = archive
        .search("tax on residents", SearchFilters::default())
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].version.citation.to_string(), "DC 47-1806.03");
}

#[tokio::test]
async fn repealed_source_records_repealed_version() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open_archive(&dir);

    let live = uslm_section(
        "999",
        r#"<subsection><num value="a">(a)</num><content>This provision applies.</content></subsection>"#,
    );
    archive.ingest(&raw(&live, "https://x/999")).await.unwrap();

    let repealed = r#"<?xml version="1.0" encoding="UTF-8"?>
<uscDoc xmlns="http://xml.house.gov/schemas/uslm/1.0">
  <section identifier="/us/usc/t26/s999" status="repealed">
    <num value="999">999.</num>
    <heading>Repealed. Pub. L. 94-455</heading>
  </section>
</uscDoc>"#;
    let outcome = archive.ingest(&raw(repealed, "https://x/999")).await.unwrap();
    assert_eq!(outcome.change, ChangeKind::Repealed);
}
