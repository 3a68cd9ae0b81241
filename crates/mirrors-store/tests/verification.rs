//! End-to-end verification of synthetic APT and YUM trees.
//!
//! Signatures use an in-memory Ed25519 keyring: a signature file holds
//! `<key id>:<hex signature>` over the signed bytes.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use mirrors_schema::{Distribution, ErrorKind, RepoKind, Target};
use mirrors_store::{
    file_digest, split_clearsigned, verify_target, verify_targets, DigestAlgorithm, LockMode,
    MirrorLayout, SignatureStatus, SignatureVerifier, SignedMetadata, StoreError, TreeLock,
    VerificationReport, VerifyContext, VerifyMode, VerifyOptions, VerifyStatus,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

struct TestKeyring {
    trusted: Vec<VerifyingKey>,
}

fn key_id(key: &VerifyingKey) -> String {
    hex::encode(&key.as_bytes()[..8])
}

fn sign(key: &SigningKey, data: &[u8]) -> String {
    let sig = key.sign(data);
    format!("{}:{}", key_id(&key.verifying_key()), hex::encode(sig.to_bytes()))
}

impl TestKeyring {
    fn check(&self, data: &[u8], signature: &str) -> SignatureStatus {
        let Some((id, sig_hex)) = signature.trim().split_once(':') else {
            return SignatureStatus::Invalid;
        };
        let Some(key) = self.trusted.iter().find(|k| key_id(k) == id) else {
            return SignatureStatus::KeyUnknown;
        };
        let Ok(bytes) = hex::decode(sig_hex) else {
            return SignatureStatus::Invalid;
        };
        let Ok(bytes) = <[u8; 64]>::try_from(bytes.as_slice()) else {
            return SignatureStatus::Invalid;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&bytes);
        if key.verify(data, &sig).is_ok() {
            SignatureStatus::Valid
        } else {
            SignatureStatus::Invalid
        }
    }
}

impl SignatureVerifier for TestKeyring {
    fn name(&self) -> &str {
        "test-ed25519"
    }

    fn verify(&self, material: &SignedMetadata<'_>) -> Result<SignatureStatus, StoreError> {
        match material {
            SignedMetadata::Detached { data, signature } => {
                Ok(self.check(data, &String::from_utf8_lossy(signature)))
            }
            SignedMetadata::Inline { message } => {
                let text = String::from_utf8_lossy(message);
                let Ok(cs) = split_clearsigned(&text) else {
                    return Ok(SignatureStatus::Invalid);
                };
                let body: String = cs
                    .signature
                    .lines()
                    .filter(|l| !l.starts_with("-----") && !l.trim().is_empty())
                    .collect();
                Ok(self.check(cs.text.as_bytes(), &body))
            }
        }
    }
}

fn trusted_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

fn untrusted_key() -> SigningKey {
    SigningKey::from_bytes(&[9u8; 32])
}

fn keyring() -> TestKeyring {
    TestKeyring {
        trusted: vec![trusted_key().verifying_key()],
    }
}

fn write(path: &Path, contents: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn debian() -> Distribution {
    let mut d = Distribution::new("debian", RepoKind::Apt);
    d.versions = vec!["bookworm".to_owned()];
    d.mirror_urls = vec!["http://deb.debian.org/debian/".to_owned()];
    d.components = vec!["main".to_owned(), "contrib".to_owned()];
    d.architectures = vec!["amd64".to_owned()];
    d
}

fn ubuntu() -> Distribution {
    let mut d = Distribution::new("ubuntu", RepoKind::Apt);
    d.versions = vec!["noble".to_owned()];
    d.mirror_urls = vec!["http://archive.ubuntu.com/ubuntu/".to_owned()];
    d.components = vec!["main".to_owned()];
    d.architectures = vec!["amd64".to_owned(), "arm64".to_owned()];
    d
}

fn rocky() -> Distribution {
    let mut d = Distribution::new("rocky", RepoKind::Yum);
    d.versions = vec!["9".to_owned()];
    d.mirror_urls = vec!["https://download.rockylinux.org/pub/rocky/".to_owned()];
    d.architectures = vec!["x86_64".to_owned()];
    d
}

struct Fixture {
    _dir: tempfile::TempDir,
    layout: MirrorLayout,
    distributions: BTreeMap<String, Distribution>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = MirrorLayout::new(dir.path().join("apt"), dir.path().join("yum"));
        let distributions = [debian(), rocky(), ubuntu()]
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        Self {
            _dir: dir,
            layout,
            distributions,
        }
    }

    fn ctx<'a>(&'a self, verifier: &'a TestKeyring, mode: VerifyMode) -> VerifyContext<'a> {
        VerifyContext {
            layout: &self.layout,
            distributions: &self.distributions,
            verifier: Some(verifier),
            options: VerifyOptions {
                mode,
                require_signature: true,
                max_parallel: 2,
            },
        }
    }

    fn bookworm(&self) -> Target {
        Target::new("debian", RepoKind::Apt, "bookworm")
    }

    /// Lay out an apt-mirror style tree and return the suite directory and
    /// the Release text listing `files`.
    fn apt_tree(&self, files: &[(&str, &[u8])]) -> (std::path::PathBuf, String) {
        let tree = self.layout.tree_path(&self.bookworm());
        let root = tree.join("mirror/deb.debian.org/debian");
        let dists = root.join("dists/bookworm");
        let mut release = String::from(
            "Origin: Debian\nSuite: stable\nCodename: bookworm\nComponents: main contrib\nArchitectures: amd64\nSHA256:\n",
        );
        for (rel, contents) in files {
            let path = dists.join(rel);
            write(&path, contents);
            let (digest, size) = file_digest(&path, DigestAlgorithm::Sha256).unwrap();
            release.push_str(&format!(" {digest} {size} {rel}\n"));
        }
        write(&root.join("pool/main/h/hello/hello_2.10_amd64.deb"), b"deb");
        write(&root.join("pool/contrib/f/foo/foo_1.0_amd64.deb"), b"deb");
        (dists, release)
    }
}

/// Write `dists/<suite>` under `root` with a Release listing `files`, signed
/// by the trusted key.
fn signed_suite(root: &Path, suite: &str, files: &[(&str, &[u8])]) {
    let dists = root.join("dists").join(suite);
    let mut release = format!("Origin: Ubuntu\nSuite: {suite}\nCodename: {suite}\nSHA256:\n");
    for (rel, contents) in files {
        let path = dists.join(rel);
        write(&path, contents);
        let (digest, size) = file_digest(&path, DigestAlgorithm::Sha256).unwrap();
        release.push_str(&format!(" {digest} {size} {rel}\n"));
    }
    write(&dists.join("Release"), release.as_bytes());
    write(
        &dists.join("Release.gpg"),
        sign(&trusted_key(), release.as_bytes()).as_bytes(),
    );
}

const INDEX_FILES: &[(&str, &[u8])] = &[
    ("main/binary-amd64/Packages", b"Package: hello\n"),
    ("main/binary-amd64/Release", b"Component: main\n"),
    ("contrib/binary-amd64/Packages", b"Package: foo\n"),
];

#[test]
fn signed_tree_with_matching_checksums_verifies() {
    let fx = Fixture::new();
    let keys = keyring();
    let (dists, release) = fx.apt_tree(INDEX_FILES);
    write(&dists.join("Release"), release.as_bytes());
    write(
        &dists.join("Release.gpg"),
        sign(&trusted_key(), release.as_bytes()).as_bytes(),
    );

    let r = verify_target(&fx.ctx(&keys, VerifyMode::Cryptographic), &fx.bookworm()).unwrap();
    assert_eq!(r.status, VerifyStatus::Verified, "{}", r.reason);
    assert_eq!(r.signature_status, Some(SignatureStatus::Valid));
    assert_eq!(r.files_checked, INDEX_FILES.len() as u64);
    assert_eq!(r.files_matched, INDEX_FILES.len() as u64);
}

#[test]
fn flipped_byte_fails_with_checksum_mismatch() {
    let fx = Fixture::new();
    let keys = keyring();
    let (dists, release) = fx.apt_tree(INDEX_FILES);
    write(&dists.join("Release"), release.as_bytes());
    write(
        &dists.join("Release.gpg"),
        sign(&trusted_key(), release.as_bytes()).as_bytes(),
    );
    let victim = dists.join("main/binary-amd64/Packages");
    let mut bytes = fs::read(&victim).unwrap();
    bytes[0] ^= 0x01;
    fs::write(&victim, bytes).unwrap();

    let r = verify_target(&fx.ctx(&keys, VerifyMode::Cryptographic), &fx.bookworm()).unwrap();
    assert_eq!(r.status, VerifyStatus::Failed);
    assert_eq!(r.kind, Some(ErrorKind::ChecksumMismatch));
    assert_eq!(r.files_checked, 3, "checking continues past the mismatch");
    assert_eq!(r.files_matched, 2);
    assert!(r.reason.contains("main/binary-amd64/Packages"));
}

#[test]
fn removed_signature_is_absent_and_fails() {
    let fx = Fixture::new();
    let keys = keyring();
    let (dists, release) = fx.apt_tree(INDEX_FILES);
    write(&dists.join("Release"), release.as_bytes());

    let r = verify_target(&fx.ctx(&keys, VerifyMode::Cryptographic), &fx.bookworm()).unwrap();
    assert_eq!(r.status, VerifyStatus::Failed);
    assert_eq!(r.signature_status, Some(SignatureStatus::Absent));
    assert_eq!(r.kind, Some(ErrorKind::SignatureAbsent));
}

#[test]
fn untrusted_key_is_key_unknown() {
    let fx = Fixture::new();
    let keys = keyring();
    let (dists, release) = fx.apt_tree(INDEX_FILES);
    write(&dists.join("Release"), release.as_bytes());
    write(
        &dists.join("Release.gpg"),
        sign(&untrusted_key(), release.as_bytes()).as_bytes(),
    );

    let r = verify_target(&fx.ctx(&keys, VerifyMode::Cryptographic), &fx.bookworm()).unwrap();
    assert_eq!(r.status, VerifyStatus::Failed);
    assert_eq!(r.signature_status, Some(SignatureStatus::KeyUnknown));
    assert_eq!(r.kind, Some(ErrorKind::KeyUnknown));
}

#[test]
fn release_edited_after_signing_is_invalid() {
    let fx = Fixture::new();
    let keys = keyring();
    let (dists, release) = fx.apt_tree(INDEX_FILES);
    let signature = sign(&trusted_key(), release.as_bytes());
    write(&dists.join("Release"), format!("{release} extra\n").as_bytes());
    write(&dists.join("Release.gpg"), signature.as_bytes());

    let r = verify_target(&fx.ctx(&keys, VerifyMode::Cryptographic), &fx.bookworm()).unwrap();
    assert_eq!(r.status, VerifyStatus::Failed);
    assert_eq!(r.signature_status, Some(SignatureStatus::Invalid));
    assert_eq!(r.files_checked, 0);
}

#[test]
fn inrelease_is_preferred_and_verified() {
    let fx = Fixture::new();
    let keys = keyring();
    let (dists, release) = fx.apt_tree(INDEX_FILES);
    let text = release.trim_end_matches('\n');
    let signature = sign(&trusted_key(), text.as_bytes());
    let inrelease = format!(
        "-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA512\n\n{text}\n-----BEGIN PGP SIGNATURE-----\n\n{signature}\n-----END PGP SIGNATURE-----\n"
    );
    write(&dists.join("InRelease"), inrelease.as_bytes());

    let r = verify_target(&fx.ctx(&keys, VerifyMode::Cryptographic), &fx.bookworm()).unwrap();
    assert_eq!(r.status, VerifyStatus::Verified, "{}", r.reason);
    assert_eq!(r.files_checked, 3);
}

#[test]
fn absent_listed_files_are_skipped() {
    let fx = Fixture::new();
    let keys = keyring();
    let (dists, mut release) = fx.apt_tree(INDEX_FILES);
    release.push_str(&format!(
        " {} 10 main/binary-amd64/Packages.xz\n",
        "a".repeat(64)
    ));
    write(&dists.join("Release"), release.as_bytes());
    write(
        &dists.join("Release.gpg"),
        sign(&trusted_key(), release.as_bytes()).as_bytes(),
    );

    let r = verify_target(&fx.ctx(&keys, VerifyMode::Cryptographic), &fx.bookworm()).unwrap();
    assert_eq!(r.status, VerifyStatus::Verified, "{}", r.reason);
    assert_eq!(r.files_checked, 3);
    assert_eq!(r.files_absent, 1);
}

#[test]
fn malformed_release_reports_parser_error() {
    let fx = Fixture::new();
    let keys = keyring();
    let (dists, _) = fx.apt_tree(INDEX_FILES);
    let release = "Suite: stable\nSHA256:\n nothex 12 main/binary-amd64/Packages\n";
    write(&dists.join("Release"), release.as_bytes());
    write(
        &dists.join("Release.gpg"),
        sign(&trusted_key(), release.as_bytes()).as_bytes(),
    );

    let r = verify_target(&fx.ctx(&keys, VerifyMode::Cryptographic), &fx.bookworm()).unwrap();
    assert_eq!(r.status, VerifyStatus::Failed);
    assert_eq!(r.kind, Some(ErrorKind::MalformedMetadata));
    assert!(r.reason.contains("line 3"), "{}", r.reason);
}

#[test]
fn structural_pass_on_complete_tree() {
    let fx = Fixture::new();
    let keys = keyring();
    let (dists, release) = fx.apt_tree(INDEX_FILES);
    write(&dists.join("Release"), release.as_bytes());

    let r = verify_target(&fx.ctx(&keys, VerifyMode::Structural), &fx.bookworm()).unwrap();
    assert_eq!(r.status, VerifyStatus::Verified, "{}", r.reason);
    assert_eq!(r.mode, VerifyMode::Structural);
}

fn yum_tree(fx: &Fixture, sign_with: Option<&SigningKey>) -> std::path::PathBuf {
    let target = Target::new("rocky", RepoKind::Yum, "9");
    let root = fx
        .layout
        .tree_path(&target)
        .join("x86_64/rocky-9-baseos-x86_64");
    let primary = root.join("repodata/primary.xml.gz");
    write(&primary, b"primary");
    let (digest, size) = file_digest(&primary, DigestAlgorithm::Sha256).unwrap();
    let repomd = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <data type="primary">
    <checksum type="sha256">{digest}</checksum>
    <location href="repodata/primary.xml.gz"/>
    <size>{size}</size>
  </data>
</repomd>
"#
    );
    write(&root.join("repodata/repomd.xml"), repomd.as_bytes());
    if let Some(key) = sign_with {
        write(
            &root.join("repodata/repomd.xml.asc"),
            sign(key, repomd.as_bytes()).as_bytes(),
        );
    }
    root
}

#[test]
fn yum_signed_repository_verifies() {
    let fx = Fixture::new();
    let keys = keyring();
    yum_tree(&fx, Some(&trusted_key()));
    let target = Target::new("rocky", RepoKind::Yum, "9");

    let r = verify_target(&fx.ctx(&keys, VerifyMode::Cryptographic), &target).unwrap();
    assert_eq!(r.status, VerifyStatus::Verified, "{}", r.reason);
    assert_eq!(r.files_checked, 1);
    assert_eq!(r.signature_status, Some(SignatureStatus::Valid));
}

#[test]
fn yum_corrupt_primary_fails() {
    let fx = Fixture::new();
    let keys = keyring();
    let root = yum_tree(&fx, Some(&trusted_key()));
    fs::write(root.join("repodata/primary.xml.gz"), b"primarY").unwrap();
    let target = Target::new("rocky", RepoKind::Yum, "9");

    let r = verify_target(&fx.ctx(&keys, VerifyMode::Cryptographic), &target).unwrap();
    assert_eq!(r.status, VerifyStatus::Failed);
    assert_eq!(r.kind, Some(ErrorKind::ChecksumMismatch));
}

#[test]
fn yum_unsigned_repository_fails_when_signatures_required() {
    let fx = Fixture::new();
    let keys = keyring();
    yum_tree(&fx, None);
    let target = Target::new("rocky", RepoKind::Yum, "9");

    let r = verify_target(&fx.ctx(&keys, VerifyMode::Cryptographic), &target).unwrap();
    assert_eq!(r.status, VerifyStatus::Failed);
    assert_eq!(r.signature_status, Some(SignatureStatus::Absent));

    let mut ctx = fx.ctx(&keys, VerifyMode::Cryptographic);
    ctx.options.require_signature = false;
    let r = verify_target(&ctx, &target).unwrap();
    assert_eq!(r.status, VerifyStatus::Verified, "{}", r.reason);
}

#[test]
fn verification_waits_for_sync_lock() {
    let fx = Fixture::new();
    let keys = keyring();
    let (dists, release) = fx.apt_tree(INDEX_FILES);
    write(&dists.join("Release"), release.as_bytes());

    let lock_path = fx.layout.lock_path(&fx.bookworm());
    let held = TreeLock::acquire(&lock_path, LockMode::Exclusive).unwrap();
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        drop(held);
    });

    let start = Instant::now();
    let r = verify_target(&fx.ctx(&keys, VerifyMode::Structural), &fx.bookworm()).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(150));
    assert_eq!(r.status, VerifyStatus::Verified, "{}", r.reason);
    releaser.join().unwrap();
}

#[test]
fn parallel_pass_builds_mergeable_report() {
    let fx = Fixture::new();
    let keys = keyring();
    let (dists, release) = fx.apt_tree(INDEX_FILES);
    write(&dists.join("Release"), release.as_bytes());
    yum_tree(&fx, None);

    let targets = vec![
        fx.bookworm(),
        Target::new("debian", RepoKind::Apt, "trixie"),
        Target::new("rocky", RepoKind::Yum, "9"),
    ];
    let ctx = fx.ctx(&keys, VerifyMode::Structural);
    let first = verify_targets(&ctx, &targets).unwrap();
    let summary = first.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.verified, 2);
    assert_eq!(summary.missing, 1);

    let second = verify_targets(&ctx, &targets[..1]).unwrap();
    let merged = first.clone().merge(second.clone());
    assert_eq!(merged, second.merge(first));
    assert_eq!(merged.len(), 3);
    assert!(merged.cleanup_allowed(&fx.bookworm().key()));

    let empty = VerificationReport::new();
    assert_eq!(merged.clone().merge(empty), merged);
}

#[test]
fn ubuntu_arm_architectures_verify_from_ports_root() {
    let fx = Fixture::new();
    let keys = keyring();
    let noble = Target::new("ubuntu", RepoKind::Apt, "noble");
    let tree = fx.layout.tree_path(&noble);
    let archive = tree.join("mirror/archive.ubuntu.com/ubuntu");
    let ports = tree.join("mirror/ports.ubuntu.com/ubuntu-ports");
    signed_suite(
        &archive,
        "noble",
        &[("main/binary-amd64/Packages", b"Package: hello\n")],
    );
    signed_suite(
        &ports,
        "noble",
        &[("main/binary-arm64/Packages", b"Package: hello\n")],
    );
    write(&archive.join("pool/main/h/hello/hello_2.10_amd64.deb"), b"deb");
    write(&ports.join("pool/main/h/hello/hello_2.10_arm64.deb"), b"deb");

    let arm64 = noble.clone().with_architecture("arm64");
    for mode in [VerifyMode::Structural, VerifyMode::Cryptographic] {
        let ctx = fx.ctx(&keys, mode);
        for target in [&noble, &arm64] {
            let r = verify_target(&ctx, target).unwrap();
            assert_eq!(r.status, VerifyStatus::Verified, "{mode} {target}: {}", r.reason);
        }
    }

    let full = verify_target(&fx.ctx(&keys, VerifyMode::Cryptographic), &noble).unwrap();
    assert_eq!(full.files_checked, 2);
    assert!(full
        .subunits
        .iter()
        .any(|s| s.name == "ports.ubuntu.com/ubuntu-ports/main/arm64"));
}

#[test]
fn unsynced_component_fails_even_when_signed() {
    let fx = Fixture::new();
    let keys = keyring();
    let (dists, release) = fx.apt_tree(INDEX_FILES);
    write(&dists.join("Release"), release.as_bytes());
    write(
        &dists.join("Release.gpg"),
        sign(&trusted_key(), release.as_bytes()).as_bytes(),
    );
    fs::remove_file(dists.join("contrib/binary-amd64/Packages")).unwrap();

    let r = verify_target(&fx.ctx(&keys, VerifyMode::Cryptographic), &fx.bookworm()).unwrap();
    assert_eq!(r.status, VerifyStatus::Failed);
    assert_eq!(r.kind, Some(ErrorKind::TreeIncomplete));
    assert!(r.reason.contains("contrib/amd64"), "{}", r.reason);
    assert_eq!(r.files_absent, 1);
    assert_eq!(r.signature_status, Some(SignatureStatus::Valid));
}

#[test]
fn removed_signature_only_fails_cryptographic_mode() {
    let fx = Fixture::new();
    let keys = keyring();
    let (dists, release) = fx.apt_tree(INDEX_FILES);
    write(&dists.join("Release"), release.as_bytes());
    write(
        &dists.join("Release.gpg"),
        sign(&trusted_key(), release.as_bytes()).as_bytes(),
    );
    let crypto = fx.ctx(&keys, VerifyMode::Cryptographic);
    let structural = fx.ctx(&keys, VerifyMode::Structural);
    assert_eq!(
        verify_target(&crypto, &fx.bookworm()).unwrap().status,
        VerifyStatus::Verified
    );

    fs::remove_file(dists.join("Release.gpg")).unwrap();

    let r = verify_target(&structural, &fx.bookworm()).unwrap();
    assert_eq!(r.status, VerifyStatus::Verified, "{}", r.reason);
    let r = verify_target(&crypto, &fx.bookworm()).unwrap();
    assert_eq!(r.status, VerifyStatus::Failed);
    assert_eq!(r.signature_status, Some(SignatureStatus::Absent));
}

#[test]
fn disjoint_batches_merge_to_the_same_counts() {
    let fx = Fixture::new();
    let keys = keyring();
    let (dists, release) = fx.apt_tree(INDEX_FILES);
    write(&dists.join("Release"), release.as_bytes());
    yum_tree(&fx, None);

    let targets = vec![
        fx.bookworm(),
        Target::new("debian", RepoKind::Apt, "trixie"),
        Target::new("rocky", RepoKind::Yum, "9"),
    ];
    let ctx = fx.ctx(&keys, VerifyMode::Structural);
    let whole = verify_targets(&ctx, &targets).unwrap();
    let split = verify_targets(&ctx, &targets[..2])
        .unwrap()
        .merge(verify_targets(&ctx, &targets[2..]).unwrap());

    assert_eq!(split.summary(), whole.summary());
    let keys_of = |r: &VerificationReport| r.iter().map(|e| e.target.clone()).collect::<Vec<_>>();
    assert_eq!(keys_of(&split), keys_of(&whole));
}

/// Delegates to the test keyring but cannot start for YUM metadata, like a
/// gpgv binary that fails to spawn.
struct FailsOnRepomd(TestKeyring);

impl SignatureVerifier for FailsOnRepomd {
    fn name(&self) -> &str {
        "fails-on-repomd"
    }

    fn verify(&self, material: &SignedMetadata<'_>) -> Result<SignatureStatus, StoreError> {
        if let SignedMetadata::Detached { data, .. } = material {
            if String::from_utf8_lossy(data).contains("<repomd") {
                return Err(StoreError::VerifierUnavailable(
                    "gpgv: No such file or directory".to_owned(),
                ));
            }
        }
        self.0.verify(material)
    }
}

#[test]
fn verifier_error_fails_only_its_target() {
    let fx = Fixture::new();
    let (dists, release) = fx.apt_tree(INDEX_FILES);
    write(&dists.join("Release"), release.as_bytes());
    write(
        &dists.join("Release.gpg"),
        sign(&trusted_key(), release.as_bytes()).as_bytes(),
    );
    yum_tree(&fx, Some(&trusted_key()));

    let verifier = FailsOnRepomd(keyring());
    let ctx = VerifyContext {
        layout: &fx.layout,
        distributions: &fx.distributions,
        verifier: Some(&verifier),
        options: VerifyOptions {
            mode: VerifyMode::Cryptographic,
            require_signature: true,
            max_parallel: 2,
        },
    };
    let rocky = Target::new("rocky", RepoKind::Yum, "9");
    let report = verify_targets(&ctx, &[fx.bookworm(), rocky.clone()]).unwrap();

    assert_eq!(report.len(), 2);
    assert!(report.cleanup_allowed(&fx.bookworm().key()));
    let failed = report.get(&rocky.key()).unwrap();
    assert_eq!(failed.status, VerifyStatus::Failed);
    assert_eq!(failed.kind, Some(ErrorKind::ExecutionFailed));
    assert!(failed.reason.contains("gpgv"), "{}", failed.reason);
}
