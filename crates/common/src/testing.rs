//! Throwaway PKI for tests.
//!
//! `TestPki` generates a private CA and issues leaf certificates from it.
//! Key usage and extended key usage follow what webpki expects for each
//! role, so the output can be fed straight into [`crate::tls`].
//!
//! Files written by [`TestPki::write_paths`] live in a temporary directory
//! that is removed when the `TestPki` is dropped.

#![allow(clippy::expect_used)] // Fixture setup failures should abort the test

use std::fs;
use std::path::PathBuf;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use tempfile::TempDir;

use crate::config::TlsPaths;
use crate::tls::{
    build_client_credentials, build_server_credentials, ClientCredentials, IdentityMaterial,
    ServerCredentials,
};

/// A leaf certificate and its private key, PEM encoded.
#[derive(Debug, Clone)]
pub struct TestIdentity {
    pub cert_pem: String,
    pub key_pem: String,
}

/// A private certificate authority backed by a temporary directory.
pub struct TestPki {
    dir: TempDir,
    ca_cert: Certificate,
    ca_key: KeyPair,
}

impl TestPki {
    /// Create a CA with common name `name`.
    pub fn new(name: &str) -> Self {
        let ca_key = KeyPair::generate().expect("generate CA key");

        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, format!("{name} test CA"));
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca_cert = params.self_signed(&ca_key).expect("self-sign CA");

        Self {
            dir: TempDir::new().expect("create temp dir"),
            ca_cert,
            ca_key,
        }
    }

    /// PEM encoding of the CA certificate.
    pub fn ca_pem(&self) -> String {
        self.ca_cert.pem()
    }

    /// Issue a server certificate valid for `dns_name` and `127.0.0.1`.
    pub fn issue_server(&self, dns_name: &str) -> TestIdentity {
        self.issue(dns_name, ExtendedKeyUsagePurpose::ServerAuth)
    }

    /// Issue a client certificate with common name `common_name`.
    pub fn issue_client(&self, common_name: &str) -> TestIdentity {
        self.issue(common_name, ExtendedKeyUsagePurpose::ClientAuth)
    }

    fn issue(&self, name: &str, usage: ExtendedKeyUsagePurpose) -> TestIdentity {
        let key = KeyPair::generate().expect("generate leaf key");

        let mut params = CertificateParams::new(vec![name.to_string(), "127.0.0.1".to_string()])
            .expect("leaf certificate params");
        params.distinguished_name.push(DnType::CommonName, name);
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![usage];

        let cert = params
            .signed_by(&key, &self.ca_cert, &self.ca_key)
            .expect("sign leaf certificate");

        TestIdentity {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        }
    }

    /// In-memory identity material trusting this CA.
    pub fn material(&self, identity: &TestIdentity) -> IdentityMaterial {
        IdentityMaterial::from_pem(
            identity.cert_pem.as_bytes(),
            identity.key_pem.as_bytes(),
            self.ca_pem().as_bytes(),
        )
    }

    /// Write `<prefix>.crt.pem`, `<prefix>.key.pem` and `ca.crt.pem` and
    /// return their paths.
    pub fn write_paths(&self, prefix: &str, identity: &TestIdentity) -> TlsPaths {
        TlsPaths {
            cert_file: self.write_file(&format!("{prefix}.crt.pem"), identity.cert_pem.as_bytes()),
            key_file: self.write_file(&format!("{prefix}.key.pem"), identity.key_pem.as_bytes()),
            ca_file: self.write_file("ca.crt.pem", self.ca_pem().as_bytes()),
        }
    }

    /// Write arbitrary bytes into the temporary directory.
    pub fn write_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("write fixture file");
        path
    }

    /// Server credentials for `localhost`, issued by this CA.
    pub fn server_credentials(&self) -> ServerCredentials {
        let identity = self.issue_server("localhost");
        build_server_credentials(&self.material(&identity)).expect("build server credentials")
    }

    /// Client credentials issued by this CA.
    pub fn client_credentials(&self) -> ClientCredentials {
        let identity = self.issue_client("monitor-client");
        build_client_credentials(&self.material(&identity)).expect("build client credentials")
    }
}
