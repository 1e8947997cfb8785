// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Verification runs against a server (or transport) which misbehaves

use super::{key, Publication, TestConfig, World};
use crate::errors::{SigtreeError, TransportError};
use crate::fetcher::memory::InMemoryFetcher;
use crate::fetcher::{Fetcher, PathQuery};
use crate::{VerificationError, Verifier, VerifyMode};
use sigtree_core::crypto::CryptoError;
use sigtree_core::hash::{sha256, Sha256Hash};
use sigtree_core::test_utils::ChainBuilder;
use sigtree_core::types::{PathAndSigs, RawLink, Uid};

// Note that this macro produces a `MockTransportFetcher` struct
mockall::mock! {
    pub TransportFetcher {}
    #[async_trait::async_trait]
    impl Fetcher for TransportFetcher {
        async fn fetch_latest_anchor_hash(&self) -> Result<Sha256Hash, TransportError>;
        async fn fetch_merkle_path(&self, query: &PathQuery) -> Result<PathAndSigs, TransportError>;
        async fn fetch_sig_chain(&self, uid: &Uid) -> Result<Vec<RawLink>, TransportError>;
        async fn fetch_public_keys(&self, uid: &Uid) -> Result<Vec<String>, TransportError>;
    }
}

fn delegate_anchor(mock: &mut MockTransportFetcher, fetcher: &InMemoryFetcher) {
    let tmp = fetcher.clone();
    mock.expect_fetch_latest_anchor_hash()
        .returning(move || futures::executor::block_on(tmp.fetch_latest_anchor_hash()));
}

fn delegate_paths(mock: &mut MockTransportFetcher, fetcher: &InMemoryFetcher) {
    let tmp = fetcher.clone();
    mock.expect_fetch_merkle_path()
        .returning(move |query| futures::executor::block_on(tmp.fetch_merkle_path(query)));
}

fn delegate_sig_chain(mock: &mut MockTransportFetcher, fetcher: &InMemoryFetcher) {
    let tmp = fetcher.clone();
    mock.expect_fetch_sig_chain()
        .returning(move |uid| futures::executor::block_on(tmp.fetch_sig_chain(uid)));
}

/// A user with a short, unremarkable chain and one reset behind them
async fn world(username: &str) -> Result<World, CryptoError> {
    let old = key(1);
    let device = key(2);
    let mut chain = ChainBuilder::new(Uid::from_username(username), username);
    chain.eldest(&old, Some("old"))?;
    chain.reset();
    chain
        .eldest(&device, Some("phone"))?
        .other(&device, "track")?
        .other(&device, "track")?;
    Publication::of(&chain, username).publish().await
}

async fn verify(world: &World) -> Result<(), SigtreeError> {
    Verifier::<TestConfig, _>::new(world.fetcher.clone())
        .verify(world.uid.as_str(), VerifyMode::Full)
        .await
        .map(|_| ())
}

#[tokio::test]
async fn test_well_behaved_baseline() -> Result<(), SigtreeError> {
    let world = world("baseline").await?;
    verify(&world).await
}

#[tokio::test]
async fn test_invalid_input() {
    let verifier = Verifier::<TestConfig, _>::new(InMemoryFetcher::new());
    for input in ["", "   ", "not a user", "bob@example.com"] {
        let err = verifier.walk(input).await.unwrap_err();
        assert!(matches!(err, SigtreeError::InvalidInput(_)), "{input:?}");
    }
}

#[tokio::test]
async fn test_unknown_user() -> Result<(), SigtreeError> {
    let world = world("known").await?;
    let err = Verifier::<TestConfig, _>::new(world.fetcher.clone())
        .walk("unknown")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SigtreeError::Transport(TransportError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_server_status() -> Result<(), SigtreeError> {
    let world = world("status").await?;
    let mut latest = world.latest.clone();
    latest.status.code = 205;
    latest.status.desc = Some("user not found".to_string());
    world.serve_latest(latest);

    let err = verify(&world).await.unwrap_err();
    assert_eq!(
        SigtreeError::Transport(TransportError::Server {
            code: 205,
            desc: "user not found".to_string()
        }),
        err
    );
    Ok(())
}

#[tokio::test]
async fn test_forged_root_signature() -> Result<(), SigtreeError> {
    let old = key(1);
    let mut chain = ChainBuilder::new(Uid::from_username("forged"), "forged");
    chain.eldest(&old, None)?;
    let mut publication = Publication::of(&chain, "forged");
    publication.root_key = key(0x43);
    let world = publication.publish().await?;

    let err = verify(&world).await.unwrap_err();
    assert!(matches!(
        err,
        SigtreeError::Verification(VerificationError::TreeIntegrity(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_anchor_mismatch() -> Result<(), SigtreeError> {
    let world = world("unanchored").await?;
    // the server answers for any anchor with the root it likes
    let bogus = sha256(b"some other root signature");
    world.fetcher.set_anchor(bogus).await;
    world
        .fetcher
        .set_path(world.uid.as_str(), Some(bogus), world.historical.clone());

    let err = verify(&world).await.unwrap_err();
    assert!(matches!(
        err,
        SigtreeError::Verification(VerificationError::TreeIntegrity(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_uid_mismatch() -> Result<(), SigtreeError> {
    let world = world("mismatch").await?;
    let mut latest = world.latest.clone();
    latest.uid = Some(Uid::from_username("somebody else"));
    world.serve_latest(latest);

    let err = verify(&world).await.unwrap_err();
    assert!(matches!(
        err,
        SigtreeError::Verification(VerificationError::TreeIntegrity(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_legacy_impostor() -> Result<(), SigtreeError> {
    let uid = Uid::parse("0123456789abcdef0123456789abcd00").unwrap();
    let mut chain = ChainBuilder::new(uid, "hal");
    chain.eldest(&key(1), None)?;
    let world = Publication::of(&chain, "hal").publish().await?;
    // mallory's lookup comes back claiming hal's legacy UID
    world.fetcher.set_path("mallory", None, world.latest.clone());

    let err = Verifier::<TestConfig, _>::new(world.fetcher.clone())
        .walk("mallory")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SigtreeError::Verification(VerificationError::TreeIntegrity(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_tampered_merkle_node() -> Result<(), SigtreeError> {
    let world = world("tampered").await?;
    let mut latest = world.latest.clone();
    latest.path[1].node.val = latest.path[1].node.val.replace("\"type\":1", "\"type\": 1");
    world.serve_latest(latest);

    let err = verify(&world).await.unwrap_err();
    assert!(matches!(
        err,
        SigtreeError::Verification(VerificationError::TreeIntegrity(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_wrong_intermediate_root() -> Result<(), SigtreeError> {
    let world = world("skippy").await?;
    // latest root 10, anchored 7: the walk visits root 8. Hand it root 9.
    let mut historical = world.historical.clone();
    assert_eq!(1, historical.skips.len());
    historical.skips = vec![world.roots[8].clone()];
    world.serve_historical(historical.clone());
    let err = verify(&world).await.unwrap_err();
    assert!(matches!(
        err,
        SigtreeError::Verification(VerificationError::SkipChainIntegrity(_))
    ));

    historical.skips.clear();
    world.serve_historical(historical);
    let err = verify(&world).await.unwrap_err();
    assert!(matches!(
        err,
        SigtreeError::Verification(VerificationError::SkipChainIntegrity(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_tampered_link() -> Result<(), SigtreeError> {
    let world = world("linky").await?;
    let mut links = world.fetcher.fetch_sig_chain(&world.uid).await?;
    links[2].payload_json = links[2].payload_json.replace("\"track\"", "\"untrack\"");
    world.fetcher.set_sig_chain(&world.uid, links);

    let err = verify(&world).await.unwrap_err();
    assert!(matches!(
        err,
        SigtreeError::Verification(VerificationError::SigChainIntegrity(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_truncated_chain() -> Result<(), SigtreeError> {
    let world = world("short").await?;
    let mut links = world.fetcher.fetch_sig_chain(&world.uid).await?;
    links.pop();
    world.fetcher.set_sig_chain(&world.uid, links);

    let err = verify(&world).await.unwrap_err();
    assert!(matches!(
        err,
        SigtreeError::Verification(VerificationError::SigChainIntegrity(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_shrinking_chain() -> Result<(), SigtreeError> {
    let device = key(1);
    let mut chain = ChainBuilder::new(Uid::from_username("shrinky"), "shrinky");
    chain.eldest(&device, None)?;
    let shorter = chain.leaf();
    chain.other(&device, "track")?;
    let mut publication = Publication::of(&chain, "shrinky");
    publication.latest_leaf = shorter;
    let world = publication.publish().await?;

    let err = verify(&world).await.unwrap_err();
    assert!(matches!(
        err,
        SigtreeError::Verification(VerificationError::SigChainIntegrity(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_tampered_reset_chain() -> Result<(), SigtreeError> {
    let world = world("resetty").await?;
    let mut latest = world.latest.clone();
    let resets = latest.reset_chain.take().unwrap_or_default();
    latest.reset_chain = Some(
        resets
            .into_iter()
            .map(|reset| reset.replace("1700000001", "1700000002"))
            .collect(),
    );
    world.serve_latest(latest.clone());
    let err = verify(&world).await.unwrap_err();
    assert!(matches!(
        err,
        SigtreeError::Verification(VerificationError::ResetChainIntegrity(_))
    ));

    // dropping the reset chain altogether is no better
    latest.reset_chain = None;
    world.serve_latest(latest);
    let err = verify(&world).await.unwrap_err();
    assert!(matches!(
        err,
        SigtreeError::Verification(VerificationError::ResetChainIntegrity(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_anchor_source_down() -> Result<(), SigtreeError> {
    let world = world("offline").await?;
    let mut mock = MockTransportFetcher::new();
    delegate_paths(&mut mock, &world.fetcher);
    mock.expect_fetch_latest_anchor_hash()
        .returning(|| Err(TransportError::Connection("horizon unreachable".to_string())));
    mock.expect_fetch_sig_chain().never();

    let err = Verifier::<TestConfig, _>::new(mock)
        .walk(world.uid.as_str())
        .await
        .unwrap_err();
    assert_eq!(
        SigtreeError::Transport(TransportError::Connection("horizon unreachable".to_string())),
        err
    );
    Ok(())
}

#[tokio::test]
async fn test_sig_chain_fetch_fails() -> Result<(), SigtreeError> {
    let world = world("flaky").await?;
    let mut mock = MockTransportFetcher::new();
    delegate_anchor(&mut mock, &world.fetcher);
    delegate_paths(&mut mock, &world.fetcher);
    mock.expect_fetch_sig_chain()
        .times(1)
        .returning(|_| Err(TransportError::Decode("truncated response".to_string())));

    let err = Verifier::<TestConfig, _>::new(mock)
        .walk(world.uid.as_str())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SigtreeError::Transport(TransportError::Decode(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_key_fetch_fails() -> Result<(), SigtreeError> {
    let world = world("keyless").await?;
    let mut mock = MockTransportFetcher::new();
    delegate_anchor(&mut mock, &world.fetcher);
    delegate_paths(&mut mock, &world.fetcher);
    delegate_sig_chain(&mut mock, &world.fetcher);
    mock.expect_fetch_public_keys()
        .returning(|_| Err(TransportError::Connection("reset by peer".to_string())));

    let verifier = Verifier::<TestConfig, _>::new(mock);
    // the tree-only walk never asks for keys
    verifier.verify(world.uid.as_str(), VerifyMode::TreeOnly).await?;
    let err = verifier
        .verify(world.uid.as_str(), VerifyMode::Full)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SigtreeError::Transport(TransportError::Connection(_))
    ));
    Ok(())
}
