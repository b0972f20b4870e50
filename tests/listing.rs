use dqm_fetch::listing::{anchor_hrefs, last_segment, table_rows};

const OFFLINE_PAGE: &str = r#"<html><head><title>Index</title></head><body>
<a href="/dqm/offline/data/browse/ROOT/OfflineData/Run2022/Muon/">Up</a>
<a href="/dqm/offline/data/browse/ROOT/OfflineData/Run2022/Muon/0003551xx/DQM_V0001_R000355100__Muon__Run2022C-PromptReco-v1__DQMIO.root">DQM_V0001_R000355100__Muon__Run2022C-PromptReco-v1__DQMIO.root</a>
<a href='/dqm/offline/data/browse/ROOT/OfflineData/Run2022/Muon/0003551xx/DQM_V0001_R000355101__Muon__Run2022C-PromptReco-v1__DQMIO.root?a=1&amp;b=2'>x</a>
</body></html>"#;

const ONLINE_PAGE: &str = r#"<table>
<TR><TH>Name</TH><TH>Size</TH><TH>Date</TH></TR>
<tr class="odd">
  <td><a href="/dqm/offline/data/browse/ROOT/OnlineData/original/00035xxxx/0003553xx/DQM_V0001_GEM_R000355361.root">DQM_V0001_GEM_R000355361.root</a></td>
  <td>2.1M</td>
  <td>2022-07-15 10:21:05 UTC</td>
</tr>
<tr><td>DQM_V0001_CSC_R000355361.root</td><td>1.0M</td><td>2022-07-15 10:21:06 UTC</td></tr>
</table>"#;

#[test]
fn anchors_in_document_order() {
    let hrefs = anchor_hrefs(OFFLINE_PAGE);
    assert_eq!(hrefs.len(), 3);
    assert_eq!(
        last_segment(&hrefs[1]),
        "DQM_V0001_R000355100__Muon__Run2022C-PromptReco-v1__DQMIO.root"
    );
    assert!(hrefs[2].ends_with("DQMIO.root?a=1&b=2"));
    assert_eq!(
        last_segment(&hrefs[2]),
        "DQM_V0001_R000355101__Muon__Run2022C-PromptReco-v1__DQMIO.root"
    );
}

#[test]
fn rows_carry_name_href_and_details() {
    let rows = table_rows(ONLINE_PAGE);
    assert_eq!(rows.len(), 2);

    assert_eq!(rows[0].name, "DQM_V0001_GEM_R000355361.root");
    assert_eq!(
        rows[0].href.as_deref(),
        Some("/dqm/offline/data/browse/ROOT/OnlineData/original/00035xxxx/0003553xx/DQM_V0001_GEM_R000355361.root")
    );
    assert_eq!(rows[0].details, vec!["2.1M", "2022-07-15 10:21:05 UTC"]);

    assert_eq!(rows[1].name, "DQM_V0001_CSC_R000355361.root");
    assert_eq!(rows[1].href, None);
}

#[test]
fn empty_page_has_no_entries() {
    assert!(anchor_hrefs("<html></html>").is_empty());
    assert!(table_rows("<table></table>").is_empty());
}
