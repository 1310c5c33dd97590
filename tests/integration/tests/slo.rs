//! Single Logout in both directions.

use chrono::Duration as ChronoDuration;
use sp_saml::bindings::HttpRedirectBinding;
use sp_saml::types::LogoutResponse;
use sp_saml::xml::XmlElement;
use sp_saml::{Query, SamlBinding, SamlError};

use crate::common::*;

#[tokio::test]
async fn idp_initiated_logout_terminates_the_session() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    sp.login(&idp, "slo-1").await.unwrap();

    let request = idp.logout_request("slo-1", true);
    let request_id = request.attr("ID").unwrap().to_string();
    let incoming = sp
        .facade
        .process_incoming(redirect_request(SP_SLO_REDIRECT, &request, "idp-relay"))
        .await
        .unwrap();

    assert_eq!(incoming.binding, SamlBinding::HttpRedirect);
    let Query::SloRequest(query) = incoming.query else {
        panic!("expected a LogoutRequest query");
    };
    assert_eq!(query.id, request_id);
    assert_eq!(query.name_id.as_deref(), Some("user@example.org"));
    assert_eq!(query.session_indexes, vec!["slo-1".to_string()]);

    assert_eq!(*sp.handler.sessions.lock().unwrap(), vec!["slo-1".to_string()]);
    assert!(sp.store.find_authentication("slo-1").await.unwrap().is_none());

    let sent = sp.sender.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].endpoint, IDP_SLO_POST);
    assert_eq!(sent[0].relay_state.as_deref(), Some("idp-relay"));
    assert!(sent[0].params.iter().any(|(name, _)| name == "SAMLResponse"));

    let response = LogoutResponse::from_element(&XmlElement::parse(&sent[0].message).unwrap())
        .unwrap();
    assert_eq!(response.in_response_to.as_deref(), Some(request_id.as_str()));
    assert_eq!(response.issuer.as_deref(), Some(SP_ENTITY));
    assert!(response.status.is_success());
}

#[tokio::test]
async fn unsigned_logout_request_is_rejected() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    sp.login(&idp, "slo-2").await.unwrap();

    let request = idp.logout_request("slo-2", false);
    let result = sp
        .facade
        .process_incoming(redirect_request(SP_SLO_REDIRECT, &request, "idp-relay"))
        .await;

    assert!(matches!(result, Err(SamlError::Security(_))));
    assert!(sp.handler.sessions.lock().unwrap().is_empty());
    assert!(sp.sender.sent.lock().unwrap().is_empty());
    assert!(sp.store.find_authentication("slo-2").await.unwrap().is_some());
}

#[tokio::test]
async fn unreachable_idp_does_not_fail_the_logout() {
    let sp = TestSp::with_sender(RecordingSender {
        unreachable: true,
        ..Default::default()
    })
    .unwrap();
    let idp = TestIdp::new();
    sp.login(&idp, "slo-3").await.unwrap();

    let request = idp.logout_request("slo-3", true);
    let incoming = sp
        .facade
        .process_incoming(redirect_request(SP_SLO_REDIRECT, &request, "idp-relay"))
        .await
        .unwrap();

    assert!(matches!(incoming.query, Query::SloRequest(_)));
    assert_eq!(*sp.handler.sessions.lock().unwrap(), vec!["slo-3".to_string()]);
    assert_eq!(sp.sender.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn sp_initiated_logout_round_trip() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    sp.login(&idp, "slo-4").await.unwrap();

    let message = sp
        .facade
        .slo_request(
            &FixedSession(Some("slo-4".to_string())),
            SamlBinding::HttpRedirect,
        )
        .await
        .unwrap();
    assert!(message.redirect_url().unwrap().starts_with(IDP_SLO_REDIRECT));

    let decoded = HttpRedirectBinding::decode_url(message.redirect_url().unwrap()).unwrap();
    let sent = XmlElement::parse(&decoded.xml).unwrap();
    assert_eq!(sent.name, "LogoutRequest");
    let request_id = sent.attr("ID").unwrap().to_string();
    assert_eq!(message.query().id(), request_id);

    let response = idp.logout_response(&request_id);
    let relay_state = message.relay_state().map(str::to_string);
    let incoming = sp
        .facade
        .process_incoming(post(SP_SLO_POST, &response, relay_state.as_deref()))
        .await
        .unwrap();

    let Query::SloResponse(result) = incoming.query else {
        panic!("expected a LogoutResponse query");
    };
    assert_eq!(result.in_response_to, request_id);
    assert_eq!(result.original_request.session_indexes, vec!["slo-4".to_string()]);
    assert_eq!(result.original_request.name_id.as_deref(), Some("user@example.org"));
    assert!(result.status.is_success());
}

#[tokio::test]
async fn logout_request_is_answered_only_once() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    sp.login(&idp, "slo-5").await.unwrap();

    let message = sp
        .facade
        .slo_request(&FixedSession(Some("slo-5".to_string())), SamlBinding::HttpPost)
        .await
        .unwrap();
    let request_id = message.query().id().to_string();

    sp.facade
        .process_incoming(post(SP_SLO_POST, &idp.logout_response(&request_id), None))
        .await
        .unwrap();

    let result = sp
        .facade
        .process_incoming(post(SP_SLO_POST, &idp.logout_response(&request_id), None))
        .await;
    assert!(matches!(result, Err(SamlError::Processing(_))));
}

#[tokio::test]
async fn logout_response_to_an_authn_request_is_rejected() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    let (request, _) = sp.start_login().await.unwrap();

    let result = sp
        .facade
        .process_incoming(post(SP_SLO_POST, &idp.logout_response(&request.id), None))
        .await;
    assert!(matches!(result, Err(SamlError::Security(_))));

    // The mismatched response consumed the pending request.
    let mut response = idp.response(&request.id, vec![idp.assertion(&request.id, "slo-6")]);
    idp.sign(&mut response);
    let result = sp.facade.process_incoming(post(ACS_POST, &response, None)).await;
    assert!(matches!(result, Err(SamlError::Processing(_))));
}

#[tokio::test]
async fn logout_without_a_session_cannot_be_built() {
    let sp = TestSp::new().unwrap();

    let missing = sp
        .facade
        .slo_request(&FixedSession(None), SamlBinding::HttpRedirect)
        .await;
    assert!(matches!(missing, Err(SamlError::Building(_))));

    let unknown = sp
        .facade
        .slo_request(
            &FixedSession(Some("never-logged-in".to_string())),
            SamlBinding::HttpRedirect,
        )
        .await;
    assert!(matches!(unknown, Err(SamlError::Building(_))));
}

#[tokio::test]
async fn expired_logout_request_is_rejected() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    sp.login(&idp, "slo-7").await.unwrap();

    let request = idp.logout_request_with("slo-7", true, ChronoDuration::minutes(-10));
    let result = sp
        .facade
        .process_incoming(redirect_request(SP_SLO_REDIRECT, &request, "idp-relay"))
        .await;

    assert!(matches!(result, Err(SamlError::Processing(_))));
    assert!(sp.handler.sessions.lock().unwrap().is_empty());
    assert!(sp.sender.sent.lock().unwrap().is_empty());
    assert!(sp.store.find_authentication("slo-7").await.unwrap().is_some());
}

#[tokio::test]
async fn unsigned_or_untrusted_logout_response_is_rejected() {
    let sp = TestSp::new().unwrap();
    let idp = TestIdp::new();
    sp.login(&idp, "slo-8").await.unwrap();

    let message = sp
        .facade
        .slo_request(&FixedSession(Some("slo-8".to_string())), SamlBinding::HttpPost)
        .await
        .unwrap();
    let request_id = message.query().id().to_string();

    let unsigned = idp.unsigned_logout_response(&request_id);
    let result = sp
        .facade
        .process_incoming(post(SP_SLO_POST, &unsigned, None))
        .await;
    assert!(matches!(result, Err(SamlError::Security(_))));

    let mut forged = idp.unsigned_logout_response(&request_id);
    idp.sign_with_rogue_key(&mut forged);
    let result = sp
        .facade
        .process_incoming(post(SP_SLO_POST, &forged, None))
        .await;
    assert!(matches!(result, Err(SamlError::Security(_))));

    // Neither consumed the pending LogoutRequest.
    let incoming = sp
        .facade
        .process_incoming(post(SP_SLO_POST, &idp.logout_response(&request_id), None))
        .await
        .unwrap();
    assert!(matches!(incoming.query, Query::SloResponse(_)));
}
