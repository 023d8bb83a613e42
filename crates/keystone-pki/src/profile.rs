//! Certificate profiles
//!
//! A [`CertProfile`] describes one identity to be minted: subject, usages,
//! SANs, CA flag and lifetime. Profiles are plain values built once per
//! identity and handed to a [`CertAuthority`](crate::CertAuthority).

use std::net::IpAddr;
use std::time::Duration;

use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, KeyUsagePurpose, SanType,
};

use crate::error::{PkiError, Result};

/// Ten years, the lifetime of every CA and most leaves
pub const VALIDITY_TEN_YEARS: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Thirty minutes, the lifetime of the kubelet bootstrap credential
pub const VALIDITY_THIRTY_MINUTES: Duration = Duration::from_secs(30 * 60);

/// Key usages carried by every CA in the hierarchy
pub const CA_KEY_USAGES: [KeyUsagePurpose; 3] = [
    KeyUsagePurpose::KeyEncipherment,
    KeyUsagePurpose::DigitalSignature,
    KeyUsagePurpose::KeyCertSign,
];

/// Key usages carried by serving/client leaves
pub const LEAF_KEY_USAGES: [KeyUsagePurpose; 2] = [
    KeyUsagePurpose::KeyEncipherment,
    KeyUsagePurpose::DigitalSignature,
];

/// Everything needed to mint one certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertProfile {
    /// Subject common name
    pub common_name: String,
    /// Subject organizations
    pub organization: Vec<String>,
    /// Subject organizational units
    pub organizational_unit: Vec<String>,
    /// Key usage purposes
    pub key_usages: Vec<KeyUsagePurpose>,
    /// Extended key usage purposes
    pub ext_key_usages: Vec<ExtendedKeyUsagePurpose>,
    /// DNS subject alternative names
    pub dns_names: Vec<String>,
    /// IP subject alternative names
    pub ip_addresses: Vec<IpAddr>,
    /// Whether the certificate may sign other certificates
    pub is_ca: bool,
    /// Lifetime from the moment of issuance
    pub validity: Duration,
}

impl CertProfile {
    /// Profile for a ten-year CA with the standard CA key usages
    pub fn ca(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            organization: Vec::new(),
            organizational_unit: Vec::new(),
            key_usages: CA_KEY_USAGES.to_vec(),
            ext_key_usages: Vec::new(),
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            is_ca: true,
            validity: VALIDITY_TEN_YEARS,
        }
    }

    /// Profile for a ten-year leaf with the standard leaf key usages
    pub fn leaf(common_name: impl Into<String>) -> Self {
        Self {
            key_usages: LEAF_KEY_USAGES.to_vec(),
            is_ca: false,
            ..Self::ca(common_name)
        }
    }

    /// Add a subject organization
    pub fn organization(mut self, org: impl Into<String>) -> Self {
        self.organization.push(org.into());
        self
    }

    /// Add a subject organizational unit
    pub fn organizational_unit(mut self, ou: impl Into<String>) -> Self {
        self.organizational_unit.push(ou.into());
        self
    }

    /// Replace the key usages
    pub fn key_usages(mut self, usages: impl IntoIterator<Item = KeyUsagePurpose>) -> Self {
        self.key_usages = usages.into_iter().collect();
        self
    }

    /// Replace the extended key usages
    pub fn ext_key_usages(
        mut self,
        usages: impl IntoIterator<Item = ExtendedKeyUsagePurpose>,
    ) -> Self {
        self.ext_key_usages = usages.into_iter().collect();
        self
    }

    /// Add DNS SANs
    pub fn dns_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.dns_names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Add IP SANs
    pub fn ip_addresses(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.ip_addresses.extend(ips);
        self
    }

    /// Replace the lifetime
    pub fn validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Translate the profile into rcgen parameters valid from now
    ///
    /// CA profiles always carry `keyCertSign`, even if the caller left it out.
    pub fn to_params(&self) -> Result<CertificateParams> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(self.common_name.clone()),
        );
        for org in &self.organization {
            dn.push(DnType::OrganizationName, DnValue::Utf8String(org.clone()));
        }
        for ou in &self.organizational_unit {
            dn.push(
                DnType::OrganizationalUnitName,
                DnValue::Utf8String(ou.clone()),
            );
        }
        params.distinguished_name = dn;

        params.key_usages = self.key_usages.clone();
        if self.is_ca {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
            if !params.key_usages.contains(&KeyUsagePurpose::KeyCertSign) {
                params.key_usages.push(KeyUsagePurpose::KeyCertSign);
            }
        } else {
            params.is_ca = IsCa::NoCa;
        }
        params.extended_key_usages = self.ext_key_usages.clone();

        let mut sans = Vec::with_capacity(self.dns_names.len() + self.ip_addresses.len());
        for name in &self.dns_names {
            let dns = Ia5String::try_from(name.clone()).map_err(|e| {
                PkiError::CertificateGeneration(format!("invalid DNS name '{}': {}", name, e))
            })?;
            sans.push(SanType::DnsName(dns));
        }
        sans.extend(self.ip_addresses.iter().copied().map(SanType::IpAddress));
        params.subject_alt_names = sans;

        let not_before = ::time::OffsetDateTime::now_utc();
        params.not_before = not_before;
        params.not_after = not_before + self.validity;

        Ok(params)
    }
}
