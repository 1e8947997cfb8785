// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The verification pipeline. A [Verifier] drives its [Fetcher] through the
//! lookups and feeds every response through the structural checks in
//! `sigtree_core`, strictly in sequence, failing fast on the first problem.

use crate::errors::{SigtreeError, TransportError};
use crate::fetcher::{Fetcher, PathQuery, Subject};
use crate::reporter::{NullReporter, Reporter, Step};

use log::{debug, info, warn};
use serde::Serialize;
use sigtree_core::crypto::{KeyImporter, StandardKeyImporter};
use sigtree_core::keys::{KeyRing, UserKeys};
use sigtree_core::player::play_sigchain;
use sigtree_core::verify::{
    check_chain_growth, check_chain_links, check_reset_chain, check_root_sigs, check_skips,
    extract_uid, walk_to_leaf,
};
use sigtree_core::{
    ChainMaxes, Configuration, FreshnessWarning, PathAndSigs, UserSigChain, VerificationError,
};
use std::marker::PhantomData;
use std::sync::Arc;

/// How far to take a verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// Stop after the tree, skip chain, sigchain hashes and reset chain
    TreeOnly,
    /// Also fetch the user's keys and replay the sigchain
    Full,
}

/// A successfully verified user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedUser {
    /// The structurally verified chain
    pub chain: UserSigChain,
    /// The replayed keys (full mode only; `None` also when the current epoch is empty)
    pub keys: Option<UserKeys>,
    /// Advisory freshness lag; never fatal
    #[serde(skip)]
    pub warnings: Vec<FreshnessWarning>,
}

/// Verifies users against the tree rooted in the configuration `TC`, fetching
/// through `F`
pub struct Verifier<TC: Configuration, F: Fetcher> {
    fetcher: F,
    reporter: Arc<dyn Reporter>,
    importer: Arc<dyn KeyImporter>,
    _config: PhantomData<TC>,
}

impl<TC: Configuration, F: Fetcher> Verifier<TC, F> {
    /// A silent verifier which only understands NaCl keys
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            reporter: Arc::new(NullReporter),
            importer: Arc::new(StandardKeyImporter::new()),
            _config: PhantomData,
        }
    }

    /// Report progress to `reporter`
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Import key bundles with `importer`, e.g. a [StandardKeyImporter] with
    /// PGP support plugged in
    pub fn with_key_importer(mut self, importer: Arc<dyn KeyImporter>) -> Self {
        self.importer = importer;
        self
    }

    /// The fetcher this verifier talks through
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Verify a user given either a UID or a username
    pub async fn verify(
        &self,
        uid_or_username: &str,
        mode: VerifyMode,
    ) -> Result<VerifiedUser, SigtreeError> {
        let chain = self.walk(uid_or_username).await?;
        let keys = match mode {
            VerifyMode::TreeOnly => None,
            VerifyMode::Full => self.load_user_keys(&chain).await?,
        };
        let warnings = chain.maxes.warnings();
        Ok(VerifiedUser {
            chain,
            keys,
            warnings,
        })
    }

    /// Walk the tree for a user and structurally verify their sigchain and
    /// reset chain against it
    pub async fn walk(&self, uid_or_username: &str) -> Result<UserSigChain, SigtreeError> {
        let subject = Subject::parse(uid_or_username)?;
        info!("Verifying {subject}");

        // The latest root the server knows about
        let latest = self
            .fetch_path(Step::FetchLatestPath, &PathQuery::latest(subject.clone()))
            .await?;
        self.reporter.start(Step::CheckRootSigs);
        let latest_root = self.conclude(
            Step::CheckRootSigs,
            check_root_sigs::<TC>(&latest, None),
            |root| format!("latest root #{} is signed", root.roots.seqno()),
        )?;

        let uid = match &subject {
            Subject::Uid(uid) => {
                if let Some(claimed) = &latest.uid {
                    if claimed != uid {
                        let err = VerificationError::TreeIntegrity(format!(
                            "Asked for {uid} but the server answered for {claimed}"
                        ));
                        return self.abort(Step::FetchLatestPath, err);
                    }
                }
                uid.clone()
            }
            Subject::Username(username) => {
                self.reporter.start(Step::ExtractUid);
                self.conclude(
                    Step::ExtractUid,
                    extract_uid(
                        username,
                        latest.uid.as_ref(),
                        latest_root.roots.body.legacy_uid_root,
                        &latest.uid_proof_path,
                    ),
                    |uid| format!("{username} maps to {uid}"),
                )?
            }
        };

        // The root most recently anchored to the blockchain
        self.reporter.start(Step::FetchAnchor);
        let anchor = self.conclude(
            Step::FetchAnchor,
            self.fetcher.fetch_latest_anchor_hash().await,
            |anchor| format!("anchored root signature {anchor}"),
        )?;
        let historical = self
            .fetch_path(
                Step::FetchHistoricalPath,
                &PathQuery::historical(uid.clone(), anchor, latest_root.roots.seqno()),
            )
            .await?;
        self.reporter.start(Step::CheckRootSigs);
        let historical_root = self.conclude(
            Step::CheckRootSigs,
            check_root_sigs::<TC>(&historical, Some(&anchor)),
            |root| format!("anchored root #{} is signed", root.roots.seqno()),
        )?;

        self.reporter.start(Step::CheckSkips);
        self.conclude(
            Step::CheckSkips,
            check_skips(
                &latest_root.roots,
                &historical_root.roots,
                &historical_root.roots_hash,
                &historical.skips,
            ),
            |_| {
                format!(
                    "root #{} descends from anchored root #{}",
                    latest_root.roots.seqno(),
                    historical_root.roots.seqno()
                )
            },
        )?;

        self.reporter.start(Step::WalkPaths);
        let tails = walk_to_leaf(latest_root.roots.body.root, &uid, &latest.path).and_then(
            |latest_tails| {
                walk_to_leaf(historical_root.roots.body.root, &uid, &historical.path)
                    .map(|historical_tails| (latest_tails, historical_tails))
            },
        );
        let (latest_tails, historical_tails) = self.conclude(Step::WalkPaths, tails, |(l, h)| {
            format!(
                "latest tree commits to {} links, anchored tree to {}",
                l.sig_tail.seqno, h.sig_tail.seqno
            )
        })?;

        self.reporter.start(Step::FetchSigChain);
        let raw_links = self.conclude(
            Step::FetchSigChain,
            self.fetcher.fetch_sig_chain(&uid).await,
            |links| format!("got {} links", links.len()),
        )?;
        self.reporter.start(Step::CheckSigChain);
        let links = self.conclude(
            Step::CheckSigChain,
            check_chain_growth(&latest_tails.sig_tail, &historical_tails.sig_tail)
                .and_then(|assertions| check_chain_links(&raw_links, &assertions)),
            |links| format!("{} links hash up", links.len()),
        )?;

        self.reporter.start(Step::CheckResetChain);
        let resets = self.conclude(
            Step::CheckResetChain,
            check_reset_chain(latest_tails.reset_tail.as_ref(), latest.reset_chain.as_deref()),
            |resets| match resets {
                Some(resets) => format!("{} resets", resets.len()),
                None => "never reset".to_string(),
            },
        )?;

        let maxes = ChainMaxes {
            sig: links.len() as u64,
            merkle: latest_tails.sig_tail.seqno,
            anchored: historical_tails.sig_tail.seqno,
        };
        for warning in maxes.warnings() {
            warn!("{uid}: {warning}");
            self.reporter.warn(&warning.to_string());
        }

        Ok(UserSigChain {
            uid,
            eldest: latest_tails.eldest_kid,
            links,
            resets,
            maxes,
        })
    }

    /// Fetch a walked user's key bundles and replay their chain. Bundles which
    /// can't be imported are skipped; replay fails if a link needs one of them.
    pub async fn load_user_keys(
        &self,
        chain: &UserSigChain,
    ) -> Result<Option<UserKeys>, SigtreeError> {
        self.reporter.start(Step::FetchKeys);
        let bundles = self.conclude(
            Step::FetchKeys,
            self.fetcher.fetch_public_keys(&chain.uid).await,
            |bundles| format!("got {} key bundles", bundles.len()),
        )?;

        let mut ring = KeyRing::new(chain.uid.clone());
        for bundle in &bundles {
            match self.importer.import(bundle) {
                Ok(key) => ring.add_key(key),
                Err(err) => {
                    debug!("Skipping key bundle for {}: {err}", chain.uid);
                    self.reporter
                        .update(Step::FetchKeys, &format!("skipped a bundle: {err}"));
                }
            }
        }

        self.reporter.start(Step::PlaySigChain);
        let keys = self.conclude(
            Step::PlaySigChain,
            play_sigchain::<TC>(chain, &mut ring, self.reporter.as_ref()),
            |keys| match keys {
                Some(keys) => format!("{} live devices", keys.devices.len()),
                None => "no links in the current epoch".to_string(),
            },
        )?;
        if let Some(keys) = &keys {
            info!(
                "{}: {} live device(s), {} live PGP key(s), per-user key {}",
                chain.uid,
                keys.devices.len(),
                keys.pgp_keys.len(),
                keys.puk
                    .as_ref()
                    .map(|puk| format!("generation {}", puk.generation))
                    .unwrap_or_else(|| "absent".to_string())
            );
        }
        Ok(keys)
    }

    async fn fetch_path(
        &self,
        step: Step,
        query: &PathQuery,
    ) -> Result<PathAndSigs, SigtreeError> {
        self.reporter.start(step);
        debug!("Fetching merkle path with {:?}", query.to_query_params());
        let result = self
            .fetcher
            .fetch_merkle_path(query)
            .await
            .and_then(|path| {
                if path.status.code != 0 {
                    Err(TransportError::Server {
                        code: path.status.code,
                        desc: path.status.desc.clone().unwrap_or_default(),
                    })
                } else {
                    Ok(path)
                }
            });
        self.conclude(step, result, |path| {
            format!("got back root #{}", path.root.seqno)
        })
    }

    fn conclude<T, E: Into<SigtreeError>>(
        &self,
        step: Step,
        result: Result<T, E>,
        detail: impl FnOnce(&T) -> String,
    ) -> Result<T, SigtreeError> {
        match result {
            Ok(value) => {
                self.reporter.success(step, &detail(&value));
                Ok(value)
            }
            Err(err) => self.abort(step, err),
        }
    }

    fn abort<T, E: Into<SigtreeError>>(&self, step: Step, err: E) -> Result<T, SigtreeError> {
        let err = err.into();
        self.reporter.fail(step, &err);
        Err(err)
    }
}
