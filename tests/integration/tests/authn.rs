//! Web SSO: AuthnRequest out, Response in.

use chrono::Duration as ChronoDuration;
use sp_saml::query::RequestParameters;
use sp_saml::types::{SAML_NS, SAMLP_NS};
use sp_saml::xml::XmlElement;
use sp_saml::{InboundRequest, Query, RelayState, SamlBinding, SamlError};

use crate::common::*;

fn expect_security<T: std::fmt::Debug>(result: Result<T, SamlError>) {
    match result {
        Err(SamlError::Security(_)) => {}
        other => panic!("expected a security error, got {other:?}"),
    }
}

fn expect_processing<T: std::fmt::Debug>(result: Result<T, SamlError>) {
    match result {
        Err(SamlError::Processing(_)) => {}
        other => panic!("expected a processing error, got {other:?}"),
    }
}

#[tokio::test]
async fn login_round_trip_keeps_request_parameters() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();

    let mut parameters = RequestParameters::new();
    parameters.insert("service".to_string(), vec!["https://app.example.org".to_string()]);
    let message = sp
        .facade
        .authn_request("idp", None, parameters.clone())
        .await
        .unwrap();
    assert_eq!(message.binding(), SamlBinding::HttpRedirect);
    assert!(message.redirect_url().unwrap().starts_with(IDP_SSO));

    let relay_state = message.relay_state().unwrap().to_string();
    assert_eq!(
        RelayState::decode(&relay_state).unwrap().binding(),
        SamlBinding::HttpRedirect
    );

    let request_id = message.query().id().to_string();
    let mut assertion = idp.assertion(&request_id, "session-1");
    idp.sign(&mut assertion);
    let mut response = idp.response(&request_id, vec![assertion]);
    idp.sign(&mut response);

    let incoming = sp
        .facade
        .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
        .await
        .unwrap();

    assert_eq!(incoming.binding, SamlBinding::HttpPost);
    assert_eq!(incoming.endpoint_url, ACS_POST);
    assert_eq!(incoming.relay_state.as_deref(), Some(relay_state.as_str()));
    let Query::AuthnResponse(result) = incoming.query else {
        panic!("expected an AuthnResponse query");
    };
    assert_eq!(result.in_response_to, request_id);
    assert_eq!(result.idp_connector_id, "idp");
    assert_eq!(result.original_request.parameters, parameters);

    let authentication = &result.authentications[0];
    assert_eq!(authentication.subject_id(), "user@example.org");
    assert_eq!(authentication.session_index(), "session-1");
    assert_eq!(authentication.idp_entity_id(), IDP_ENTITY);
    assert_eq!(
        authentication.attribute("ctemail"),
        Some(&["testValue".to_string()][..])
    );
    assert_eq!(
        authentication.attribute("groups"),
        Some(&["staff".to_string(), "admins".to_string()][..])
    );

    let stored = sp.store.find_authentication("session-1").await.unwrap();
    assert_eq!(stored.as_ref(), Some(authentication));
}

#[tokio::test]
async fn authn_request_targets_the_assertion_consumer_service() {
    let sp = TestSp::new().unwrap();
    let (request, relay_state) = sp.start_login().await.unwrap();

    assert_eq!(request.issuer, SP_ENTITY);
    assert_eq!(request.destination.as_deref(), Some(IDP_SSO));
    assert_eq!(request.assertion_consumer_service_url.as_deref(), Some(ACS_POST));
    assert_eq!(request.protocol_binding, SamlBinding::HttpPost);
    assert!(!relay_state.is_empty());
}

#[tokio::test]
async fn signed_assertion_in_unsigned_response_is_accepted() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let (request, relay_state) = sp.start_login().await.unwrap();

    let mut assertion = idp.assertion(&request.id, "session-2");
    idp.sign(&mut assertion);
    let response = idp.response(&request.id, vec![assertion]);

    let incoming = sp
        .facade
        .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
        .await
        .unwrap();
    assert!(matches!(incoming.query, Query::AuthnResponse(_)));
}

#[tokio::test]
async fn signed_response_covers_unsigned_assertions() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let (request, relay_state) = sp.start_login().await.unwrap();

    let assertion = idp.assertion(&request.id, "session-3");
    let mut response = idp.response(&request.id, vec![assertion]);
    idp.sign(&mut response);

    sp.facade
        .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
        .await
        .unwrap();
}

#[tokio::test]
async fn unsigned_response_is_rejected() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let (request, relay_state) = sp.start_login().await.unwrap();

    let assertion = idp.assertion(&request.id, "session-4");
    let response = idp.response(&request.id, vec![assertion]);

    expect_security(
        sp.facade
            .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
            .await,
    );
    assert!(sp.store.find_authentication("session-4").await.unwrap().is_none());
}

#[tokio::test]
async fn assertion_injected_after_signing_is_rejected() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let (request, relay_state) = sp.start_login().await.unwrap();

    let assertion = idp.assertion(&request.id, "session-5");
    let mut response = idp.response(&request.id, vec![assertion]);
    idp.sign(&mut response);
    response
        .children
        .push(idp.assertion(&request.id, "session-forged"));

    expect_security(
        sp.facade
            .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
            .await,
    );
}

#[tokio::test]
async fn unsigned_assertion_next_to_a_signed_one_is_rejected() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let (request, relay_state) = sp.start_login().await.unwrap();

    let mut signed = idp.assertion(&request.id, "session-6");
    idp.sign(&mut signed);
    let forged = idp.assertion(&request.id, "session-forged");
    let response = idp.response(&request.id, vec![signed, forged]);

    expect_security(
        sp.facade
            .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
            .await,
    );
}

#[tokio::test]
async fn response_signed_by_an_unknown_key_is_rejected() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let (request, relay_state) = sp.start_login().await.unwrap();

    let mut assertion = idp.assertion(&request.id, "session-7");
    idp.sign_with_rogue_key(&mut assertion);
    let mut response = idp.response(&request.id, vec![assertion]);
    idp.sign_with_rogue_key(&mut response);

    expect_security(
        sp.facade
            .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
            .await,
    );
}

#[tokio::test]
async fn response_to_an_unknown_request_is_rejected() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();

    let mut response = idp.response("_never-sent", vec![idp.assertion("_never-sent", "session-8")]);
    idp.sign(&mut response);

    expect_processing(sp.facade.process_incoming(post(ACS_POST, &response, None)).await);
}

#[tokio::test]
async fn request_is_answered_only_once() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let (request, relay_state) = sp.start_login().await.unwrap();

    let mut first = idp.response(&request.id, vec![idp.assertion(&request.id, "session-9")]);
    idp.sign(&mut first);
    sp.facade
        .process_incoming(post(ACS_POST, &first, Some(&relay_state)))
        .await
        .unwrap();

    let mut second = idp.response(&request.id, vec![idp.assertion(&request.id, "session-10")]);
    idp.sign(&mut second);
    expect_processing(
        sp.facade
            .process_incoming(post(ACS_POST, &second, Some(&relay_state)))
            .await,
    );
}

#[tokio::test]
async fn replayed_session_index_is_rejected() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    sp.login(&idp, "session-11").await.unwrap();

    let (request, relay_state) = sp.start_login().await.unwrap();
    let mut response = idp.response(&request.id, vec![idp.assertion(&request.id, "session-11")]);
    idp.sign(&mut response);

    expect_security(
        sp.facade
            .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
            .await,
    );
}

#[tokio::test]
async fn replayed_message_is_rejected() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let (request, relay_state) = sp.start_login().await.unwrap();

    let mut response = idp.response(&request.id, vec![idp.assertion(&request.id, "session-12")]);
    idp.sign(&mut response);
    sp.facade
        .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
        .await
        .unwrap();

    expect_security(
        sp.facade
            .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
            .await,
    );
}

#[tokio::test]
async fn expired_assertion_is_rejected() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let (request, relay_state) = sp.start_login().await.unwrap();

    let assertion = idp.assertion_with(&request.id, "session-13", ChronoDuration::minutes(-3));
    let mut response = idp.response(&request.id, vec![assertion]);
    idp.sign(&mut response);

    expect_processing(
        sp.facade
            .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
            .await,
    );
}

#[tokio::test]
async fn encrypted_assertion_is_decrypted() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let (request, relay_state) = sp.start_login().await.unwrap();

    let assertion = idp.assertion(&request.id, "session-14");
    let encrypted = idp.encrypt(&assertion);
    let mut response = idp.response(&request.id, vec![encrypted]);
    idp.sign(&mut response);

    let incoming = sp
        .facade
        .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
        .await
        .unwrap();
    let Query::AuthnResponse(result) = incoming.query else {
        panic!("expected an AuthnResponse query");
    };
    assert_eq!(result.authentications[0].session_index(), "session-14");
    assert_eq!(
        result.authentications[0].attribute("ctemail"),
        Some(&["testValue".to_string()][..])
    );
}

#[tokio::test]
async fn response_on_the_logout_endpoint_is_rejected() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let (request, relay_state) = sp.start_login().await.unwrap();

    let mut response = idp.response(&request.id, vec![idp.assertion(&request.id, "session-15")]);
    idp.sign(&mut response);

    expect_processing(
        sp.facade
            .process_incoming(post(SP_SLO_POST, &response, Some(&relay_state)))
            .await,
    );

    // Rejected before its signature was checked, so its ID is not spent.
    sp.facade
        .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
        .await
        .unwrap();
}

#[tokio::test]
async fn untrusted_signature_does_not_spend_the_message_id() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let (request, relay_state) = sp.start_login().await.unwrap();

    let mut response = idp.response(&request.id, vec![idp.assertion(&request.id, "session-23")]);
    idp.sign_with_rogue_key(&mut response);
    expect_security(
        sp.facade
            .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
            .await,
    );

    idp.sign(&mut response);
    sp.facade
        .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
        .await
        .unwrap();
}

#[tokio::test]
async fn repeated_session_index_within_a_response_stores_nothing() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let (request, relay_state) = sp.start_login().await.unwrap();

    let assertions = vec![
        idp.assertion(&request.id, "session-24"),
        idp.assertion(&request.id, "session-24"),
    ];
    let mut response = idp.response(&request.id, assertions);
    idp.sign(&mut response);

    expect_security(
        sp.facade
            .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
            .await,
    );
    assert!(sp.store.find_authentication("session-24").await.unwrap().is_none());
}

#[tokio::test]
async fn response_from_another_idp_is_rejected() {
    let sp = TestSp::with_config(&two_idp_config(), RecordingSender::default()).unwrap();
    let second = TestIdp::second();

    // idp2 is trusted for the requests sent to it.
    let (own, relay_state) = sp.start_login_at("idp2").await.unwrap();
    let mut response = second.response(&own.id, vec![second.assertion(&own.id, "session-25")]);
    second.sign(&mut response);
    let incoming = sp
        .facade
        .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
        .await
        .unwrap();
    let Query::AuthnResponse(result) = incoming.query else {
        panic!("expected an AuthnResponse query");
    };
    assert_eq!(result.idp_connector_id, "idp2");

    // It cannot answer a request sent to idp.
    let (request, relay_state) = sp.start_login_at("idp").await.unwrap();
    let mut response =
        second.response(&request.id, vec![second.assertion(&request.id, "session-26")]);
    second.sign(&mut response);
    expect_security(
        sp.facade
            .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
            .await,
    );
    assert!(sp.store.find_authentication("session-26").await.unwrap().is_none());
}

#[tokio::test]
async fn encrypted_identifier_and_attribute_are_merged() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let (request, relay_state) = sp.start_login().await.unwrap();

    let mut assertion = idp.assertion(&request.id, "session-27");
    let subject = assertion
        .children
        .iter_mut()
        .find(|c| c.is(SAML_NS, "Subject"))
        .unwrap();
    let name_id = subject.children.remove(0);
    assert!(name_id.is(SAML_NS, "NameID"));
    subject.children.insert(0, idp.encrypt_as(&name_id, "EncryptedID"));

    let secret = XmlElement::new("saml", "Attribute", SAML_NS)
        .with_attr("Name", "employeeNumber")
        .with_child(XmlElement::new("saml", "AttributeValue", SAML_NS).with_text("4711"));
    let statement = assertion
        .children
        .iter_mut()
        .find(|c| c.is(SAML_NS, "AttributeStatement"))
        .unwrap();
    statement
        .children
        .push(idp.encrypt_as(&secret, "EncryptedAttribute"));

    let mut response = idp.response(&request.id, vec![assertion]);
    idp.sign(&mut response);
    let incoming = sp
        .facade
        .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
        .await
        .unwrap();

    let Query::AuthnResponse(result) = incoming.query else {
        panic!("expected an AuthnResponse query");
    };
    let authentication = &result.authentications[0];
    assert_eq!(authentication.subject_id(), "user@example.org");
    assert_eq!(
        authentication.attribute("employeeNumber"),
        Some(&["4711".to_string()][..])
    );
    assert_eq!(
        authentication.attribute("ctemail"),
        Some(&["testValue".to_string()][..])
    );
}

#[tokio::test]
async fn unmapped_binding_segment_is_unsupported() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let response = idp.response("_r", vec![idp.assertion("_r", "session-16")]);

    let result = sp
        .facade
        .process_incoming(post(
            "https://sp.example.org/cas/Shibboleth.sso/SAML2/Artifact",
            &response,
            None,
        ))
        .await;
    assert!(matches!(result, Err(SamlError::UnsupportedOperation(_))));
}

#[tokio::test]
async fn authn_request_from_an_idp_is_unsupported() {
    let sp = TestSp::new().unwrap();
    let request = XmlElement::new("samlp", "AuthnRequest", SAMLP_NS).with_attr("ID", "_x");

    let result = sp
        .facade
        .process_incoming(post_param(ACS_POST, "SAMLRequest", &request, None))
        .await;
    assert!(matches!(result, Err(SamlError::UnsupportedOperation(_))));
}

#[tokio::test]
async fn garbage_payload_is_a_processing_error() {
    let sp = TestSp::new().unwrap();
    let request =
        InboundRequest::post(ACS_POST, [("SAMLResponse", "%%% not base64 %%%")]).unwrap();

    expect_processing(sp.facade.process_incoming(request).await);
}

#[tokio::test]
async fn assertion_without_subject_is_rejected() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let (request, relay_state) = sp.start_login().await.unwrap();

    let assertion = idp
        .assertion(&request.id, "session-17")
        .without_children(SAML_NS, "Subject");
    let mut response = idp.response(&request.id, vec![assertion]);
    idp.sign(&mut response);

    expect_processing(
        sp.facade
            .process_incoming(post(ACS_POST, &response, Some(&relay_state)))
            .await,
    );
}
