//! Common test utilities

#![allow(dead_code)]

use janus::models::ScanConfig;

/// Creates a test ScanConfig with short timeouts
pub fn test_config() -> ScanConfig {
    janus::telemetry::init_tracing("janus=debug");
    ScanConfig {
        timeout_secs: 10,
        user_agent: "Janus-Test/0.1.0".to_string(),
        ..ScanConfig::default()
    }
}

pub const ADOBE_WILDCARD: &str = r#"<?xml version="1.0"?>
<!DOCTYPE cross-domain-policy SYSTEM "http://www.adobe.com/xml/dtds/cross-domain-policy.dtd">
<cross-domain-policy>
  <site-control permitted-cross-domain-policies="all"/>
  <allow-access-from domain="*"/>
</cross-domain-policy>"#;

pub const ADOBE_RESTRICTED: &str = r#"<?xml version="1.0"?>
<cross-domain-policy>
  <site-control permitted-cross-domain-policies="master-only"/>
  <allow-access-from domain="*.example.com" secure="true"/>
  <allow-http-request-headers-from domain="www.example.com" headers="SOAPAction"/>
</cross-domain-policy>"#;

pub const SILVERLIGHT_WILDCARD: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<access-policy>
  <cross-domain-access>
    <policy>
      <allow-from http-request-headers="*">
        <domain uri="*"/>
      </allow-from>
      <grant-to>
        <resource path="/" include-subpaths="true"/>
      </grant-to>
    </policy>
  </cross-domain-access>
</access-policy>"#;
