//! End-to-end tests of the SAML service provider live in `tests/`.
