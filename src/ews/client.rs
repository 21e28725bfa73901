//! SOAP-over-HTTP EWS client.
//!
//! Speaks just two operations: GetFolder to resolve the account's calendar
//! folder (delegate access, explicit server, no autodiscover) and CreateItem
//! to save the meeting with invitations sent to all attendees.

use chrono::SecondsFormat;
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::core::config::REQUEST_TIMEOUT;
use crate::ews::error::{EwsError, Result};
use crate::ews::models::{CalendarEvent, EwsConfig, FolderId, ItemId};

const SOAP_PREFIX: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"
               xmlns:m="http://schemas.microsoft.com/exchange/services/2006/messages"
               xmlns:t="http://schemas.microsoft.com/exchange/services/2006/types">
  <soap:Header>
    <t:RequestServerVersion Version="Exchange2013_SP1"/>
  </soap:Header>
  <soap:Body>
"#;

const SOAP_SUFFIX: &str = "  </soap:Body>\n</soap:Envelope>\n";

pub struct EwsClient {
    client: Client,
    config: EwsConfig,
    endpoint: String,
}

impl EwsClient {
    pub fn new(config: EwsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EwsError::Configuration(e.to_string()))?;
        let endpoint = config.endpoint();

        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    /// Resolve the account's default calendar folder. This doubles as the
    /// authentication check: it is the first request that hits the server.
    pub async fn resolve_calendar(&self) -> Result<FolderId> {
        let body = get_folder_request(&self.config.username);
        let xml = self.send_soap("GetFolder", body).await?;
        let (id, change_key) = parse_soap_response(&xml, b"FolderId")?;

        info!(
            "Resolved calendar folder for {} on {}",
            self.config.username, self.config.server
        );
        Ok(FolderId { id, change_key })
    }

    /// Save one calendar item into `folder`, asking the server to send the
    /// meeting invitation to all attendees (and only to them).
    pub async fn create_event(&self, folder: &FolderId, event: &CalendarEvent) -> Result<ItemId> {
        let body = create_item_request(folder, event);
        debug!("Creating event: {}", event.subject);

        // At this stage every failure is a persistence failure, whatever
        // the transport said.
        let xml = self
            .send_soap("CreateItem", body)
            .await
            .map_err(|e| match e {
                e @ EwsError::Persistence(_) => e,
                other => EwsError::Persistence(other.to_string()),
            })?;
        let (id, change_key) =
            parse_soap_response(&xml, b"ItemId").map_err(|e| EwsError::Persistence(e.to_string()))?;

        info!("Created calendar item {}", id);
        Ok(ItemId { id, change_key })
    }

    async fn send_soap(&self, operation: &str, body: String) -> Result<String> {
        debug!("Sending {} to {}", operation, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Content-Type", "text/xml; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| EwsError::Transient {
                server: self.config.server.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| EwsError::Transient {
            server: self.config.server.clone(),
            message: e.to_string(),
        })?;

        if status == StatusCode::UNAUTHORIZED {
            let message = if text.trim().is_empty() {
                status.to_string()
            } else {
                text
            };
            return Err(EwsError::Authentication {
                server: self.config.server.clone(),
                message,
            });
        }
        if !status.is_success() {
            return Err(EwsError::Persistence(format!(
                "{} failed: {} - {}",
                operation, status, text
            )));
        }

        Ok(text)
    }
}

fn get_folder_request(mailbox: &str) -> String {
    format!(
        r#"{prefix}    <m:GetFolder>
      <m:FolderShape>
        <t:BaseShape>IdOnly</t:BaseShape>
      </m:FolderShape>
      <m:FolderIds>
        <t:DistinguishedFolderId Id="calendar">
          <t:Mailbox>
            <t:EmailAddress>{mailbox}</t:EmailAddress>
          </t:Mailbox>
        </t:DistinguishedFolderId>
      </m:FolderIds>
    </m:GetFolder>
{suffix}"#,
        prefix = SOAP_PREFIX,
        mailbox = escape(mailbox),
        suffix = SOAP_SUFFIX,
    )
}

fn create_item_request(folder: &FolderId, event: &CalendarEvent) -> String {
    let mut attendees = String::new();
    for attendee in &event.required_attendees {
        attendees.push_str(&format!(
            r#"          <t:Attendee>
            <t:Mailbox>
              <t:EmailAddress>{}</t:EmailAddress>
            </t:Mailbox>
            <t:ResponseType>{}</t:ResponseType>
          </t:Attendee>
"#,
            escape(attendee.email_address.as_str()),
            attendee.response_type.as_str(),
        ));
    }

    format!(
        r#"{prefix}    <m:CreateItem SendMeetingInvitations="SendOnlyToAll">
      <m:SavedItemFolderId>
        <t:FolderId Id="{folder_id}" ChangeKey="{change_key}"/>
      </m:SavedItemFolderId>
      <m:Items>
        <t:CalendarItem>
          <t:Subject>{subject}</t:Subject>
          <t:Start>{start}</t:Start>
          <t:End>{end}</t:End>
          <t:Location>{location}</t:Location>
          <t:RequiredAttendees>
{attendees}          </t:RequiredAttendees>
        </t:CalendarItem>
      </m:Items>
    </m:CreateItem>
{suffix}"#,
        prefix = SOAP_PREFIX,
        folder_id = escape(folder.id.as_str()),
        change_key = escape(folder.change_key.as_str()),
        subject = escape(event.subject.as_str()),
        start = event.start.to_rfc3339_opts(SecondsFormat::Secs, false),
        end = event.end.to_rfc3339_opts(SecondsFormat::Secs, false),
        location = escape(event.location.as_str()),
        attendees = attendees,
        suffix = SOAP_SUFFIX,
    )
}

fn attr(element: &BytesStart<'_>, name: &str) -> Option<String> {
    element
        .try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

fn id_attrs(element: &BytesStart<'_>) -> Option<(String, String)> {
    match (attr(element, "Id"), attr(element, "ChangeKey")) {
        (Some(id), Some(change_key)) => Some((id, change_key)),
        _ => None,
    }
}

/// Walk one EWS response envelope: check the ResponseClass of the response
/// message and pull out the Id/ChangeKey pair of `id_element`.
fn parse_soap_response(xml: &str, id_element: &[u8]) -> Result<(String, String)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut response_class: Option<String> = None;
    let mut message_text = String::new();
    let mut in_message_text = false;
    let mut found: Option<(String, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = e.local_name();
                if name.as_ref().ends_with(b"ResponseMessage") && response_class.is_none() {
                    response_class = attr(e, "ResponseClass");
                } else if name.as_ref() == b"MessageText" {
                    in_message_text = true;
                } else if name.as_ref() == id_element && found.is_none() {
                    found = id_attrs(e);
                }
            }
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == id_element && found.is_none() {
                    found = id_attrs(e);
                }
            }
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"MessageText" {
                    in_message_text = false;
                }
            }
            Ok(Event::Text(ref e)) if in_message_text => {
                message_text.push_str(&e.unescape().unwrap_or_default());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(EwsError::Response(e.to_string())),
            _ => {}
        }
    }

    if response_class.as_deref() == Some("Error") {
        let message = if message_text.is_empty() {
            "unspecified EWS error".to_string()
        } else {
            message_text
        };
        return Err(EwsError::Response(message));
    }

    found.ok_or_else(|| {
        EwsError::Response(format!(
            "no {} element in response",
            String::from_utf8_lossy(id_element)
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ews::models::{Attendee, ResponseType};
    use chrono::TimeZone;
    use chrono_tz::Asia::Shanghai;

    const GET_FOLDER_OK: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <m:GetFolderResponse xmlns:m="http://schemas.microsoft.com/exchange/services/2006/messages"
                         xmlns:t="http://schemas.microsoft.com/exchange/services/2006/types">
      <m:ResponseMessages>
        <m:GetFolderResponseMessage ResponseClass="Success">
          <m:ResponseCode>NoError</m:ResponseCode>
          <m:Folders>
            <t:CalendarFolder>
              <t:FolderId Id="AAMkADcalendar" ChangeKey="AQAAABc1"/>
            </t:CalendarFolder>
          </m:Folders>
        </m:GetFolderResponseMessage>
      </m:ResponseMessages>
    </m:GetFolderResponse>
  </s:Body>
</s:Envelope>"#;

    const CREATE_ITEM_OK: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <m:CreateItemResponse xmlns:m="http://schemas.microsoft.com/exchange/services/2006/messages"
                          xmlns:t="http://schemas.microsoft.com/exchange/services/2006/types">
      <m:ResponseMessages>
        <m:CreateItemResponseMessage ResponseClass="Success">
          <m:ResponseCode>NoError</m:ResponseCode>
          <m:Items>
            <t:CalendarItem>
              <t:ItemId Id="AAMkADitem" ChangeKey="DwAAABY2"/>
            </t:CalendarItem>
          </m:Items>
        </m:CreateItemResponseMessage>
      </m:ResponseMessages>
    </m:CreateItemResponse>
  </s:Body>
</s:Envelope>"#;

    const CREATE_ITEM_FAILED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <m:CreateItemResponse xmlns:m="http://schemas.microsoft.com/exchange/services/2006/messages">
      <m:ResponseMessages>
        <m:CreateItemResponseMessage ResponseClass="Error">
          <m:MessageText>The request failed schema validation.</m:MessageText>
          <m:ResponseCode>ErrorSchemaValidation</m:ResponseCode>
        </m:CreateItemResponseMessage>
      </m:ResponseMessages>
    </m:CreateItemResponse>
  </s:Body>
</s:Envelope>"#;

    fn sample_event() -> CalendarEvent {
        let start = Shanghai.with_ymd_and_hms(2018, 3, 21, 18, 0, 0).unwrap();
        let end = Shanghai.with_ymd_and_hms(2018, 3, 21, 19, 30, 0).unwrap();
        CalendarEvent {
            subject: "Tech night 03-21".to_string(),
            location: "6F-F16 Skybolt".to_string(),
            start,
            end,
            required_attendees: vec![Attendee {
                email_address: "skybolt@example.com".to_string(),
                response_type: ResponseType::Accept,
            }],
        }
    }

    fn test_client(server_url: &str) -> EwsClient {
        let config = EwsConfig::new(server_url, "alice@example.com", "hunter2");
        EwsClient::new(config).unwrap()
    }

    #[test]
    fn test_create_item_request_body() {
        let folder = FolderId {
            id: "AAMkADcalendar".to_string(),
            change_key: "AQAAABc1".to_string(),
        };
        let body = create_item_request(&folder, &sample_event());

        assert!(body.contains(r#"SendMeetingInvitations="SendOnlyToAll""#));
        assert!(body.contains("<t:Start>2018-03-21T18:00:00+08:00</t:Start>"));
        assert!(body.contains("<t:End>2018-03-21T19:30:00+08:00</t:End>"));
        assert!(body.contains("<t:EmailAddress>skybolt@example.com</t:EmailAddress>"));
        assert!(body.contains("<t:ResponseType>Accept</t:ResponseType>"));
        // Exactly one attendee
        assert_eq!(body.matches("<t:Attendee>").count(), 1);
    }

    #[test]
    fn test_request_bodies_escape_markup() {
        let folder = FolderId {
            id: "id".to_string(),
            change_key: "ck".to_string(),
        };
        let mut event = sample_event();
        event.subject = "Q&A <review>".to_string();
        let body = create_item_request(&folder, &event);
        assert!(body.contains("<t:Subject>Q&amp;A &lt;review&gt;</t:Subject>"));

        let body = get_folder_request("a&b@example.com");
        assert!(body.contains("<t:EmailAddress>a&amp;b@example.com</t:EmailAddress>"));
    }

    #[test]
    fn test_parse_folder_response() {
        let (id, change_key) = parse_soap_response(GET_FOLDER_OK, b"FolderId").unwrap();
        assert_eq!(id, "AAMkADcalendar");
        assert_eq!(change_key, "AQAAABc1");
    }

    #[test]
    fn test_parse_error_response() {
        let err = parse_soap_response(CREATE_ITEM_FAILED, b"ItemId").unwrap_err();
        match err {
            EwsError::Response(message) => {
                assert!(message.contains("schema validation"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_calendar() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::Regex(
                r#"DistinguishedFolderId Id="calendar""#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body(GET_FOLDER_OK)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let folder = client.resolve_calendar().await.unwrap();
        assert_eq!(folder.id, "AAMkADcalendar");
    }

    #[tokio::test]
    async fn test_resolve_calendar_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(401)
            .with_body("invalid credentials")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client.resolve_calendar().await.unwrap_err();
        match err {
            EwsError::Authentication { message, .. } => {
                assert!(message.contains("invalid credentials"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_calendar_connection_refused() {
        // Nothing listens on port 1
        let client = test_client("http://127.0.0.1:1");
        let err = client.resolve_calendar().await.unwrap_err();
        assert!(matches!(err, EwsError::Transient { .. }));
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn test_create_event() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::Regex("SendOnlyToAll".to_string()))
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body(CREATE_ITEM_OK)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let folder = FolderId {
            id: "AAMkADcalendar".to_string(),
            change_key: "AQAAABc1".to_string(),
        };
        let item = client.create_event(&folder, &sample_event()).await.unwrap();
        assert_eq!(item.id, "AAMkADitem");
    }

    #[tokio::test]
    async fn test_create_event_server_error_is_persistence() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(500)
            .with_body("internal server error")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let folder = FolderId {
            id: "id".to_string(),
            change_key: "ck".to_string(),
        };
        let err = client.create_event(&folder, &sample_event()).await.unwrap_err();
        assert!(matches!(err, EwsError::Persistence(_)));
        assert_eq!(err.exit_code(), 5);
    }

    #[tokio::test]
    async fn test_create_event_schema_error_is_persistence() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body(CREATE_ITEM_FAILED)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let folder = FolderId {
            id: "id".to_string(),
            change_key: "ck".to_string(),
        };
        let err = client.create_event(&folder, &sample_event()).await.unwrap_err();
        match err {
            EwsError::Persistence(message) => {
                assert!(message.contains("schema validation"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
