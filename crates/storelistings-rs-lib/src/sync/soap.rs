//! SOAP envelopes for the update service and helpers for reading its replies.
//!
//! The envelopes are fixed templates; only the message id, timestamps, cookie, category and
//! device attributes vary between requests.

use roxmltree::Node;

use super::{Cookie, TargetParams};

pub(super) const SOAP_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub(super) const WU_NS: &str = "http://www.microsoft.com/SoftwareDistribution/Server/ClientWebService";

/// Non-leaf update ids every sync reports as installed, ahead of the ids found so far.
const INSTALLED_NON_LEAF_UPDATE_IDS: [u32; 76] = [
	1, 2, 3, 10, 11, 17, 19, 2359974, 2359977, 5143990, 5169043, 5169044, 5169047, 8788830,
	8806526, 9125350, 9154769, 10809856, 23110993, 23110994, 23110995, 23110996, 23110999,
	23111000, 23111001, 23111002, 23111003, 23111004, 24513870, 28880263, 30077688, 30486944,
	59830006, 59830007, 59830008, 60484010, 62450018, 62450019, 62450020, 98959022, 98959023,
	98959024, 98959025, 98959026, 105939029, 105995585, 106017178, 107825194, 117765322,
	129905029, 130040030, 130040031, 130040032, 130040033, 133399034, 138372035, 138372036,
	139536037, 139536038, 139536039, 139536040, 142045136, 158941041, 158941042, 158941043,
	158941044, 159776047, 160733048, 160733049, 160733050, 160733051, 160733055, 160733056,
	161870057, 161870058, 161870059,
];

fn timestamp() -> String {
	chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn message_id() -> String {
	format!("urn:uuid:{}", uuid::Uuid::new_v4())
}

/// Escapes text for inclusion in element content.
pub(super) fn escape(s: &str) -> String {
	s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn int_list<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
	ids.into_iter().map(|id| format!("<int>{}</int>", escape(id))).collect::<Vec<_>>().join("\n")
}

pub(super) fn get_cookie() -> String {
	let now = timestamp();
	format!(r#"<Envelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns="http://www.w3.org/2003/05/soap-envelope">
    <Header>
        <Action d3p1:mustUnderstand="1" xmlns:d3p1="http://www.w3.org/2003/05/soap-envelope" xmlns="http://www.w3.org/2005/08/addressing">http://www.microsoft.com/SoftwareDistribution/Server/ClientWebService/GetCookie</Action>
        <MessageID xmlns="http://www.w3.org/2005/08/addressing">{message_id}</MessageID>
        <To d3p1:mustUnderstand="1" xmlns:d3p1="http://www.w3.org/2003/05/soap-envelope" xmlns="http://www.w3.org/2005/08/addressing">https://fe3.delivery.mp.microsoft.com/ClientWebService/client.asmx</To>
        <Security d3p1:mustUnderstand="1" xmlns:d3p1="http://www.w3.org/2003/05/soap-envelope" xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">
            <Timestamp xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">
                <Created>{now}</Created>
                <Expires>2044-08-02T20:09:03Z</Expires>
            </Timestamp>
            <WindowsUpdateTicketsToken d4p1:id="ClientMSA" xmlns:d4p1="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd" xmlns="http://schemas.microsoft.com/msus/2014/10/WindowsUpdateAuthorization"></WindowsUpdateTicketsToken>
        </Security>
    </Header>
    <Body>
        <GetCookie xmlns="http://www.microsoft.com/SoftwareDistribution/Server/ClientWebService">
            <oldCookie>
                <Expiration>2016-07-27T07:18:09Z</Expiration>
            </oldCookie>
            <lastChange>2015-10-21T17:01:07.1472913Z</lastChange>
            <currentTime>{now}</currentTime>
            <protocolVersion>2.50</protocolVersion>
        </GetCookie>
    </Body>
</Envelope>"#, message_id = message_id(), now = now)
}

fn security_header(action: &str, to: &str) -> String {
	format!(r#"<s:Header>
    <a:Action s:mustUnderstand="1">http://www.microsoft.com/SoftwareDistribution/Server/ClientWebService/{action}</a:Action>
    <a:MessageID>{message_id}</a:MessageID>
    <a:To s:mustUnderstand="1">{to}</a:To>
    <o:Security s:mustUnderstand="1" xmlns:o="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">
      <Timestamp xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">
        <Created>{now}</Created>
        <Expires>2044-08-02T20:09:03Z</Expires>
      </Timestamp>
      <wuws:WindowsUpdateTicketsToken wsu:id="ClientMSA" xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd" xmlns:wuws="http://schemas.microsoft.com/msus/2014/10/WindowsUpdateAuthorization"></wuws:WindowsUpdateTicketsToken>
    </o:Security>
  </s:Header>"#, action = action, message_id = message_id(), to = to, now = timestamp())
}

/// `SyncUpdates` request. `seen` is reported both as installed and as cached.
pub(super) fn sync_updates(cookie: &Cookie, category_id: &str, params: &TargetParams, seen: &[String]) -> String {
	let fixed: Vec<String> = INSTALLED_NON_LEAF_UPDATE_IDS.iter().map(|id| id.to_string()).collect();
	let installed = int_list(fixed.iter().chain(seen).map(|s| s.as_str()));
	let cached = int_list(seen.iter().map(|s| s.as_str()));
	let language = escape(&params.locale.language);
	let tag = escape(&params.locale.tag());

	format!(r#"<s:Envelope xmlns:a="http://www.w3.org/2005/08/addressing" xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  {header}
  <s:Body>
    <SyncUpdates xmlns="http://www.microsoft.com/SoftwareDistribution/Server/ClientWebService">
      <cookie>
        <Expiration>{expiration}</Expiration>
        <EncryptedData>{data}</EncryptedData>
      </cookie>
      <parameters>
        <ExpressQuery>false</ExpressQuery>
        <InstalledNonLeafUpdateIDs>
          {installed}
        </InstalledNonLeafUpdateIDs>
        <OtherCachedUpdateIDs>
          {cached}
        </OtherCachedUpdateIDs>
        <SkipSoftwareSync>false</SkipSoftwareSync>
        <NeedTwoGroupOutOfScopeUpdates>true</NeedTwoGroupOutOfScopeUpdates>
        <FilterAppCategoryIds>
          <CategoryIdentifier>
            <Id>{category_id}</Id>
          </CategoryIdentifier>
        </FilterAppCategoryIds>
        <TreatAppCategoryIdsAsInstalled>true</TreatAppCategoryIdsAsInstalled>
        <AlsoPerformRegularSync>false</AlsoPerformRegularSync>
        <ComputerSpec />
        <ExtendedUpdateInfoParameters>
          <XmlUpdateFragmentTypes>
            <XmlUpdateFragmentType>Extended</XmlUpdateFragmentType>
            <XmlUpdateFragmentType>Published</XmlUpdateFragmentType>
            <XmlUpdateFragmentType>Core</XmlUpdateFragmentType>
          </XmlUpdateFragmentTypes>
          <Locales>
            <string>{tag}</string>
            <string>{language}</string>
          </Locales>
        </ExtendedUpdateInfoParameters>
        <ClientPreferredLanguages>
          <string>{tag}</string>
        </ClientPreferredLanguages>
        <ProductsParameters>
          <SyncCurrentVersionOnly>false</SyncCurrentVersionOnly>
          <DeviceAttributes>{attributes}</DeviceAttributes>
          <CallerAttributes>Interactive=1;IsSeeker=0;</CallerAttributes>
          <Products />
        </ProductsParameters>
      </parameters>
    </SyncUpdates>
  </s:Body>
</s:Envelope>"#,
		header = security_header("SyncUpdates", "https://fe3.delivery.mp.microsoft.com/ClientWebService/client.asmx"),
		expiration = escape(&cookie.expiration),
		data = escape(&cookie.data),
		installed = installed,
		cached = cached,
		category_id = escape(category_id),
		tag = tag,
		language = language,
		attributes = escape(&params.device_attributes()),
	)
}

/// `GetExtendedUpdateInfo2` request for the file locations of one update revision.
pub(super) fn get_extended_update_info2(update_id: &str, revision_number: &str, params: &TargetParams) -> String {
	format!(r#"<s:Envelope xmlns:a="http://www.w3.org/2005/08/addressing" xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  {header}
  <s:Body>
    <GetExtendedUpdateInfo2 xmlns="http://www.microsoft.com/SoftwareDistribution/Server/ClientWebService">
      <updateIDs>
        <UpdateIdentity>
          <UpdateID>{update_id}</UpdateID>
          <RevisionNumber>{revision_number}</RevisionNumber>
        </UpdateIdentity>
      </updateIDs>
      <infoTypes>
        <XmlUpdateFragmentType>FileUrl</XmlUpdateFragmentType>
        <XmlUpdateFragmentType>FileDecryption</XmlUpdateFragmentType>
      </infoTypes>
      <deviceAttributes>{attributes}</deviceAttributes>
    </GetExtendedUpdateInfo2>
  </s:Body>
</s:Envelope>"#,
		header = security_header("GetExtendedUpdateInfo2", "https://fe3.delivery.mp.microsoft.com/ClientWebService/client.asmx/secured"),
		update_id = escape(update_id),
		revision_number = escape(revision_number),
		attributes = escape(&params.device_attributes()),
	)
}

/* Reading replies */

fn is_named(node: &Node, namespace: Option<&str>, name: &str) -> bool {
	node.is_element() && node.tag_name().name() == name && (namespace.is_none() || node.tag_name().namespace() == namespace)
}

/// First child element called `name`, in `namespace` when one is given.
pub(super) fn find_child<'a, 'input>(node: Node<'a, 'input>, namespace: Option<&str>, name: &str) -> Option<Node<'a, 'input>> {
	node.children().find(|n| is_named(n, namespace, name))
}

pub(super) fn child<'a, 'input>(node: Node<'a, 'input>, namespace: Option<&str>, name: &str) -> crate::Result<Node<'a, 'input>> {
	find_child(node, namespace, name)
		.ok_or_else(|| crate::Error::Parse(format!("<{}> has no <{}> element", node.tag_name().name(), name)))
}

pub(super) fn children<'a, 'input: 'a>(node: Node<'a, 'input>, namespace: Option<&'a str>, name: &'a str) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
	node.children().filter(move |n| is_named(n, namespace, name))
}

pub(super) fn wu_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> crate::Result<Node<'a, 'input>> {
	child(node, Some(WU_NS), name)
}

pub(super) fn text(node: Node) -> String {
	node.text().unwrap_or_default().to_string()
}

pub(super) fn attribute<'a>(node: Node<'a, '_>, name: &str) -> crate::Result<&'a str> {
	node.attribute(name)
		.ok_or_else(|| crate::Error::Parse(format!("<{}> has no {} attribute", node.tag_name().name(), name)))
}

/// Text of a SOAP fault's reason, if `body` holds one.
fn fault_reason(body: Node) -> Option<String> {
	let fault = find_child(body, Some(SOAP_NS), "Fault")?;
	let reason = find_child(fault, Some(SOAP_NS), "Reason")
		.and_then(|r| find_child(r, Some(SOAP_NS), "Text"))
		.map(text)
		.unwrap_or_else(|| "unspecified SOAP fault".to_string());
	Some(reason)
}

/// Checks the HTTP status, parses the envelope and hands its `Body` to `read`.
///
/// A fault in the body becomes [`crate::Error::Protocol`], other failures [`crate::Error::Transport`].
pub(super) fn read_body<T>(response: crate::transport::TransportResponse, url: &str, read: impl FnOnce(Node) -> crate::Result<T>) -> crate::Result<T> {
	let doc = match roxmltree::Document::parse(&response.body) {
		Ok(doc) => doc,
		Err(e) if response.is_success() => return Err(e.into()),
		/* Error pages are rarely XML, report the status instead of the parse failure */
		Err(_) => return Err(crate::Error::Transport { status: response.status, url: url.to_string() }),
	};
	let body = child(doc.root_element(), Some(SOAP_NS), "Body");
	if let Ok(body) = body {
		if let Some(reason) = fault_reason(body) {
			return Err(crate::Error::Protocol(reason));
		}
	}
	if !response.is_success() {
		return Err(crate::Error::Transport { status: response.status, url: url.to_string() });
	}
	read(body?)
}
