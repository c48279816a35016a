//! Synthetic network identities
//!
//! Obfuscated links carry a decoy host, port and credential so they can be
//! handed to a third-party converter without revealing the real server.

use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use uuid::Uuid;

/// Produces decoy identity values unrelated to the real node
pub trait IdentityFaker: Send + Sync {
    /// Returns a syntactically valid host name
    fn generate_host(&self) -> String;

    /// Returns a port number
    fn generate_port(&self) -> u16;

    /// Returns a credential usable as a uuid or password
    fn generate_credential(&self) -> String;
}

const TLDS: &[&str] = &["com", "net", "org", "io", "dev", "app"];

/// Faker backed by the thread-local RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomFaker;

impl IdentityFaker for RandomFaker {
    fn generate_host(&self) -> String {
        let mut rng = rand::thread_rng();
        let label: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        let tld = TLDS.choose(&mut rng).copied().unwrap_or("com");
        format!("{}.{}", label, tld)
    }

    fn generate_port(&self) -> u16 {
        rand::thread_rng().gen_range(1024..=u16::MAX)
    }

    fn generate_credential(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// A faked host/port/credential triple, fixed once per node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeIdentity {
    pub hostname: String,
    pub port: u16,
    pub credential: String,
}

impl FakeIdentity {
    pub fn generate(faker: &dyn IdentityFaker) -> Self {
        Self {
            hostname: faker.generate_host(),
            port: faker.generate_port(),
            credential: faker.generate_credential(),
        }
    }
}
