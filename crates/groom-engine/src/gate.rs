//! The two-pass repair protocol.
//!
//! A run without a previous report only scans and reports. A run handed a
//! previous report reads its delete candidates, scans again, and mutates
//! only what the candidates name and the new scan still finds wrong. Each
//! run ends with a fresh report that can authorize the next one.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use groom_audit::{AuditRecord, HandleRole, RunMode};
use groom_core::types::NODE_TYPE;
use groom_core::{
    ConnectionMode, Edge, ErrorCategory, GraphAccess, GraphProvider, NodeTypeDescriptor,
    PropertyValue, TypeCatalog, Vertex, VertexId,
};

use crate::audit;
use crate::candidates::{CandidateKind, CandidateSet};
use crate::classifier::{Classification, Classifier};
use crate::duplicates::DuplicateResolver;
use crate::edges::{EdgeIntegrityChecker, EndpointCheck, EndpointState};
use crate::error::{GroomError, Result, EXIT_CLEAN, EXIT_DATA, EXIT_FINDINGS};
use crate::mutator::Mutator;
use crate::options::{in_window, GroomOptions};
use crate::report::{DuplicateGroup, Finding, GhostSource, Keeper, ReportWriter, RunReport};

/// What a completed run leaves behind.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub report_path: PathBuf,
    pub audit: AuditRecord,
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        if !self.report.errors.is_empty() {
            EXIT_DATA
        } else if self.report.has_findings() {
            EXIT_FINDINGS
        } else {
            EXIT_CLEAN
        }
    }
}

/// Properties written by an index repair: the discriminator restored to
/// `descriptor`'s type, every other reserved or indexed property replaced by
/// its placeholder.
pub fn index_repair_properties(
    id: VertexId,
    descriptor: &NodeTypeDescriptor,
) -> Vec<(String, PropertyValue)> {
    let mut props = vec![(
        NODE_TYPE.to_string(),
        PropertyValue::from(descriptor.name.as_str()),
    )];
    props.extend(
        descriptor
            .repairable_properties()
            .into_iter()
            .map(|(name, kind)| (name, kind.placeholder(id))),
    );
    props
}

pub struct RepairGate<'a, P: GraphProvider> {
    provider: &'a P,
    catalog: &'a dyn TypeCatalog,
}

impl<'a, P: GraphProvider> RepairGate<'a, P> {
    pub fn new(provider: &'a P, catalog: &'a dyn TypeCatalog) -> Self {
        Self { provider, catalog }
    }

    /// One invocation: Scan, then FixFromReport when candidates were supplied,
    /// then Report.
    pub async fn run(&self, options: &GroomOptions) -> Result<RunOutcome> {
        options.validate(self.catalog)?;

        let mut candidates = match &options.previous_report {
            Some(path) => CandidateSet::load(path, options.candidate_filter())?,
            None => CandidateSet::empty(),
        };
        let loaded = candidates.len();
        let discarded = candidates.enforce_cap(options.max_fix);
        let mode = if candidates.is_empty() {
            RunMode::ReportOnly
        } else {
            RunMode::Fix
        };

        let writer = ReportWriter::create(&options.output_dir, Utc::now())?;

        let primary_mode = if options.never_use_cache {
            ConnectionMode::Fresh
        } else {
            ConnectionMode::Cached
        };
        let primary = self
            .provider
            .open(primary_mode)
            .await
            .map_err(GroomError::Handle)?;
        let verifier = if options.skip_edge_checks || options.skip_ghost2_check {
            None
        } else {
            Some(
                self.provider
                    .open(ConnectionMode::Fresh)
                    .await
                    .map_err(GroomError::Handle)?,
            )
        };

        let mut session = audit::start_run_session(mode, options);
        session.set_candidates(loaded, discarded);
        let mut report = RunReport::new(session.id(), mode, options.node_types(self.catalog));
        report.candidates_loaded = loaded;
        report.candidates_discarded = discarded;

        tracing::info!(
            run_id = %report.run_id,
            %mode,
            candidates = loaded,
            discarded,
            report = %writer.path().display(),
            "Grooming run started"
        );

        let mut run = Run {
            primary: &primary,
            verifier: verifier.as_ref(),
            catalog: self.catalog,
            options,
            mutator: Mutator::new(&primary, verifier.as_ref(), candidates, session),
            report,
            cutoff: options.window_cutoff(Utc::now()),
            ghosts: BTreeSet::new(),
            visited: BTreeSet::new(),
            deleted: BTreeSet::new(),
            repaired: BTreeSet::new(),
            edge_findings: BTreeSet::new(),
        };

        let timed_out = match options.run_limit() {
            Some(limit) => tokio::time::timeout(limit, run.execute()).await.is_err(),
            None => {
                run.execute().await;
                false
            }
        };
        if timed_out {
            tracing::error!(minutes = options.max_run_minutes, "Run limit exceeded; nothing committed");
            run.mutator.abandon().await;
            run.report.aborted = Some(format!(
                "timeout after {} minutes",
                options.max_run_minutes
            ));
        } else {
            run.mutator.flush(&mut run.report).await;
        }

        let Run {
            report, mutator, ..
        } = run;
        let mut session = mutator.into_session();
        let report_path = writer.path().to_path_buf();
        let written = writer.write(&report);

        audit::record_run_results(&mut session, &report, &report_path);
        if let Err(e) = &written {
            session.record_failure(&e.to_string());
        }
        let audit = audit::finalize_and_store(session, options.audit_dir.as_deref());
        written?;

        if timed_out {
            return Err(GroomError::Timeout {
                minutes: options.max_run_minutes,
            });
        }

        tracing::info!(
            run_id = %report.run_id,
            findings = report.findings.len(),
            nodes_scanned = report.counters.nodes_scanned,
            edges_scanned = report.counters.edges_scanned,
            deletes = report.counters.deletes,
            index_repairs = report.counters.index_repairs,
            errors = report.errors.len(),
            "Grooming run complete"
        );
        Ok(RunOutcome {
            report,
            report_path,
            audit,
        })
    }

    /// Report-only run, pause, then a fix run authorized by the first
    /// report. A clean first run ends things early.
    pub async fn run_auto_fix(&self, options: &GroomOptions, pause: Duration) -> Result<RunOutcome> {
        let scan = GroomOptions {
            previous_report: None,
            ..options.clone()
        };
        let first = self.run(&scan).await?;
        if !first.report.has_findings() {
            tracing::info!("First pass found nothing; skipping fix pass");
            return Ok(first);
        }

        tracing::info!(
            pause_secs = pause.as_secs(),
            report = %first.report_path.display(),
            "Waiting before fix pass"
        );
        tokio::time::sleep(pause).await;

        let fix = GroomOptions {
            previous_report: Some(first.report_path.clone()),
            ..options.clone()
        };
        self.run(&fix).await
    }
}

/// State of one run in progress.
struct Run<'a, G: GraphAccess> {
    primary: &'a G,
    verifier: Option<&'a G>,
    catalog: &'a dyn TypeCatalog,
    options: &'a GroomOptions,
    mutator: Mutator<'a, G>,
    report: RunReport,
    cutoff: Option<DateTime<Utc>>,
    /// Confirmed ghosts. Their edges are not checked.
    ghosts: BTreeSet<VertexId>,
    /// Vertices already placed in a finding or duplicate group.
    visited: BTreeSet<VertexId>,
    /// Vertices with a queued delete.
    deleted: BTreeSet<VertexId>,
    /// Vertices with a queued index repair.
    repaired: BTreeSet<VertexId>,
    /// Vertices whose finding came from the edge scan.
    edge_findings: BTreeSet<VertexId>,
}

impl<'a, G: GraphAccess> Run<'a, G> {
    async fn execute(&mut self) {
        let catalog = self.catalog;
        for node_type in self.report.node_types.clone() {
            let Some(descriptor) = catalog.descriptor(&node_type) else {
                continue;
            };
            self.scan_type(descriptor).await;
            if self.options.single_commits {
                self.mutator.flush(&mut self.report).await;
            }
        }
        if !self.options.edges_only {
            tracing::info!(
                nodes_scanned = self.report.counters.nodes_scanned,
                ghosts = self.ghosts.len(),
                "Vertex scan complete"
            );
        }

        if !self.options.skip_edge_checks {
            self.check_edges().await;
        }
    }

    // ── Vertex scan ──────────────────────────────────────────────

    async fn scan_type(&mut self, descriptor: &'a NodeTypeDescriptor) {
        let node_type = descriptor.name.as_str();
        let ids = match self.primary.vertex_ids_of_type(node_type).await {
            Ok(ids) => ids,
            Err(e) => {
                self.report.record_error(
                    ErrorCategory::Data,
                    format!("node type {node_type}"),
                    e.to_string(),
                );
                return;
            }
        };

        let classifier = Classifier::new(self.primary);
        let mut groups: Vec<Vec<VertexId>> = Vec::new();
        let mut scanned = 0u64;

        for id in ids {
            if self.visited.contains(&id) {
                continue;
            }
            let vertex = match self.primary.vertex(id).await {
                Ok(Some(vertex)) => vertex,
                Ok(None) => continue,
                Err(e) => {
                    self.report
                        .record_error(ErrorCategory::Data, format!("vertex {id}"), e.to_string());
                    continue;
                }
            };
            if !in_window(&vertex, self.cutoff) {
                continue;
            }
            scanned += 1;

            let classification = match classifier.classify(&vertex, descriptor).await {
                Ok(c) => c,
                Err(e) => {
                    self.report
                        .record_error(ErrorCategory::Data, format!("vertex {id}"), e.to_string());
                    continue;
                }
            };
            tracing::debug!(vertex = %id, node_type, ?classification, "Vertex classified");

            match classification {
                Classification::Healthy | Classification::Inconclusive { .. } => {}
                Classification::Ghost(source) => {
                    self.ghost(id, Some(node_type.to_string()), source).await;
                }
                Classification::Orphan => self.orphan(id, node_type).await,
                Classification::MissingDiscriminator => {
                    self.missing_discriminator(&vertex, Some(descriptor)).await;
                }
                Classification::Duplicates { members, .. } => {
                    if self.options.skip_dupe_check {
                        continue;
                    }
                    let members: Vec<VertexId> = members
                        .into_iter()
                        .filter(|m| !self.visited.contains(m))
                        .collect();
                    if members.len() < 2 {
                        continue;
                    }
                    self.visited.extend(members.iter().copied());
                    groups.push(members);
                }
            }
        }
        self.report.counters.nodes_scanned += scanned;

        let group_count = groups.len();
        for members in groups {
            self.resolve_group(descriptor, members).await;
        }
        tracing::info!(node_type, scanned, duplicate_groups = group_count, "Node type scanned");
    }

    async fn ghost(&mut self, id: VertexId, node_type: Option<String>, source: GhostSource) {
        self.ghosts.insert(id);
        self.visited.insert(id);
        self.report.findings.push(Finding::Ghost {
            vertex: id,
            node_type,
            source,
        });
        if self
            .mutator
            .delete_vertex(
                id,
                CandidateKind::Phantom.label(),
                HandleRole::Primary,
                &mut self.report,
            )
            .await
        {
            self.deleted.insert(id);
        }
    }

    async fn orphan(&mut self, id: VertexId, node_type: &str) {
        self.visited.insert(id);
        self.report.findings.push(Finding::Orphan {
            vertex: id,
            node_type: node_type.to_string(),
        });
        if self.options.skip_orphan_fix {
            return;
        }
        if self
            .mutator
            .delete_vertex(
                id,
                CandidateKind::Orphan.label(),
                HandleRole::Primary,
                &mut self.report,
            )
            .await
        {
            self.deleted.insert(id);
        }
    }

    /// Record a vertex without a usable discriminator. When authorized it is
    /// either index-repaired or deleted, never both. Vertices an earlier
    /// repair already stamped are deleted.
    async fn missing_discriminator(
        &mut self,
        vertex: &Vertex,
        descriptor: Option<&NodeTypeDescriptor>,
    ) {
        let id = vertex.id;
        self.visited.insert(id);
        self.report.findings.push(Finding::MissingDiscriminator {
            vertex: id,
            node_type: descriptor.map(|d| d.name.clone()),
        });
        if !self.mutator.authorizes_vertex(id) {
            return;
        }

        let category = CandidateKind::MissingNodeType.label();
        match descriptor {
            Some(d) if !self.options.skip_index_update_fix && !vertex.has_dummy_marker() => {
                let props = index_repair_properties(id, d);
                if self
                    .mutator
                    .repair_index(id, props, category, &mut self.report)
                    .await
                {
                    self.repaired.insert(id);
                }
            }
            _ => {
                if self
                    .mutator
                    .delete_vertex(id, category, HandleRole::Primary, &mut self.report)
                    .await
                {
                    self.deleted.insert(id);
                }
            }
        }
    }

    async fn resolve_group(&mut self, descriptor: &NodeTypeDescriptor, members: Vec<VertexId>) {
        let resolver = DuplicateResolver::new(self.primary);
        let keeper = match resolver.resolve(descriptor, &members).await {
            Ok(keeper) => keeper,
            Err(e) => {
                self.report.record_error(
                    ErrorCategory::Data,
                    format!("duplicate group {members:?}"),
                    e.to_string(),
                );
                Keeper::Undetermined
            }
        };
        self.report.counters.duplicate_groups += 1;
        let group = DuplicateGroup {
            node_type: descriptor.name.clone(),
            members,
            keeper,
        };
        tracing::info!(
            node_type = %group.node_type,
            members = ?group.members,
            keeper = %group.keeper,
            "Duplicate group found"
        );

        if self.options.dupe_fix && keeper != Keeper::Undetermined {
            let mut all_deleted = true;
            for id in group.non_keepers().collect::<Vec<_>>() {
                if self
                    .mutator
                    .delete_vertex(
                        id,
                        CandidateKind::Duplicate.label(),
                        HandleRole::Primary,
                        &mut self.report,
                    )
                    .await
                {
                    self.deleted.insert(id);
                } else {
                    all_deleted = false;
                }
            }
            if all_deleted {
                self.report.resolved_groups.push(group);
                return;
            }
        }
        self.report.findings.push(Finding::Duplicates(group));
    }

    // ── Edge scan ────────────────────────────────────────────────

    async fn check_edges(&mut self) {
        let ids = match self.primary.edge_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                self.report
                    .record_error(ErrorCategory::Data, "edges".to_string(), e.to_string());
                return;
            }
        };
        let checker = EdgeIntegrityChecker::new(self.primary, self.verifier, self.catalog);
        let mut dangling = 0usize;

        for id in ids {
            let edge = match self.primary.edge(id).await {
                Ok(Some(edge)) => edge,
                Ok(None) => continue,
                Err(e) => {
                    self.report
                        .record_error(ErrorCategory::Data, format!("edge {id}"), e.to_string());
                    continue;
                }
            };
            self.report.counters.edges_scanned += 1;

            let skip = [edge.out_vertex, edge.in_vertex].iter().any(|v| {
                self.ghosts.contains(v) || self.deleted.contains(v) || self.repaired.contains(v)
            });
            if skip {
                continue;
            }

            let bad = match checker.bad_endpoints(&edge).await {
                Ok(bad) => bad,
                Err(e) => {
                    self.report
                        .record_error(ErrorCategory::Data, format!("edge {id}"), e.to_string());
                    continue;
                }
            };
            let Some(first) = bad.first() else {
                continue;
            };
            dangling += 1;
            self.report.findings.push(Finding::DanglingEdge {
                edge: id,
                endpoint: first.vertex,
            });

            // One finding per vertex: an endpoint the vertex scan already
            // reported keeps that finding.
            for check in &bad {
                if self.visited.contains(&check.vertex) {
                    continue;
                }
                if check.ghost2 {
                    self.ghosts.insert(check.vertex);
                    self.report.findings.push(Finding::Ghost {
                        vertex: check.vertex,
                        node_type: None,
                        source: GhostSource::SecondHandle,
                    });
                } else if check.primary == EndpointState::MissingDiscriminator {
                    self.report.findings.push(Finding::MissingDiscriminator {
                        vertex: check.vertex,
                        node_type: None,
                    });
                } else {
                    continue;
                }
                self.visited.insert(check.vertex);
                self.edge_findings.insert(check.vertex);
            }

            self.repair_edge(&edge, &bad).await;
        }
        tracing::info!(
            edges_scanned = self.report.counters.edges_scanned,
            dangling,
            "Edge scan complete"
        );
    }

    /// Remove a dangling edge's bad endpoint if authorized, otherwise the
    /// edge itself if authorized. Endpoints the vertex scan reported are
    /// left to that scan's verdict.
    async fn repair_edge(&mut self, edge: &Edge, bad: &[EndpointCheck]) {
        let open: Vec<&EndpointCheck> = bad
            .iter()
            .filter(|c| {
                !self.visited.contains(&c.vertex) || self.edge_findings.contains(&c.vertex)
            })
            .collect();

        if self.options.ghost2_fix && self.verifier.is_some() {
            for check in open.iter().filter(|c| c.ghost2_only()) {
                if self
                    .mutator
                    .delete_vertex(
                        check.vertex,
                        CandidateKind::Phantom.label(),
                        HandleRole::Verification,
                        &mut self.report,
                    )
                    .await
                {
                    self.deleted.insert(check.vertex);
                    return;
                }
            }
        }

        for check in open
            .iter()
            .filter(|c| c.primary != EndpointState::Unfetchable && !c.ghost2_only())
        {
            let category = match check.primary {
                EndpointState::MissingDiscriminator => CandidateKind::MissingNodeType,
                _ => CandidateKind::Phantom,
            };
            if self
                .mutator
                .delete_vertex(
                    check.vertex,
                    category.label(),
                    HandleRole::Primary,
                    &mut self.report,
                )
                .await
            {
                self.deleted.insert(check.vertex);
                return;
            }
        }

        self.mutator
            .delete_edge(edge.id, CandidateKind::BadEdge.label(), &mut self.report)
            .await;
    }
}
