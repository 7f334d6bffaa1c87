//! Taiwan financial institution codes (FISC participant directory).

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaiwanBank {
    pub code: &'static str,
    pub name: &'static str,
    pub short_name: &'static str,
}

const fn bank(code: &'static str, name: &'static str, short_name: &'static str) -> TaiwanBank {
    TaiwanBank {
        code,
        name,
        short_name,
    }
}

pub const TAIWAN_BANKS: &[TaiwanBank] = &[
    bank("004", "臺灣銀行", "臺銀"),
    bank("005", "臺灣土地銀行", "土銀"),
    bank("006", "合作金庫商業銀行", "合庫"),
    bank("007", "第一商業銀行", "一銀"),
    bank("008", "華南商業銀行", "華銀"),
    bank("009", "彰化商業銀行", "彰銀"),
    bank("011", "上海商業儲蓄銀行", "上海銀"),
    bank("012", "台北富邦商業銀行", "富邦"),
    bank("013", "國泰世華商業銀行", "國泰"),
    bank("016", "高雄銀行", "高雄銀"),
    bank("017", "兆豐國際商業銀行", "兆豐"),
    bank("018", "農業金庫", "農金"),
    bank("021", "花旗(台灣)商業銀行", "花旗"),
    bank("022", "美國銀行", "美銀"),
    bank("025", "首都銀行", "首都"),
    bank("039", "澳盛(台灣)商業銀行", "澳盛"),
    bank("048", "王道商業銀行", "王道"),
    bank("050", "臺灣中小企業銀行", "臺企銀"),
    bank("052", "渣打國際商業銀行", "渣打"),
    bank("053", "台中商業銀行", "台中銀"),
    bank("054", "京城商業銀行", "京城"),
    bank("081", "匯豐(台灣)商業銀行", "匯豐"),
    bank("101", "瑞興商業銀行", "瑞興"),
    bank("102", "華泰商業銀行", "華泰"),
    bank("103", "臺灣新光商業銀行", "新光"),
    bank("108", "陽信商業銀行", "陽信"),
    bank("118", "板信商業銀行", "板信"),
    bank("147", "三信商業銀行", "三信"),
    bank("700", "中華郵政", "郵局"),
    bank("803", "聯邦商業銀行", "聯邦"),
    bank("805", "遠東國際商業銀行", "遠銀"),
    bank("806", "元大商業銀行", "元大"),
    bank("807", "永豐商業銀行", "永豐"),
    bank("808", "玉山商業銀行", "玉山"),
    bank("809", "凱基商業銀行", "凱基"),
    bank("810", "星展(台灣)商業銀行", "星展"),
    bank("812", "台新國際商業銀行", "台新"),
    bank("815", "日盛國際商業銀行", "日盛"),
    bank("816", "安泰商業銀行", "安泰"),
    bank("822", "中國信託商業銀行", "中信"),
    bank("824", "連線商業銀行", "LINE Bank"),
    bank("826", "樂天國際商業銀行", "樂天"),
    bank("827", "將來商業銀行", "將來"),
];

pub fn bank_by_code(code: &str) -> Option<&'static TaiwanBank> {
    TAIWAN_BANKS.iter().find(|bank| bank.code == code)
}

/// `"<code> <short name>"`, as shown in a bank picker.
pub fn format_bank_option(bank: &TaiwanBank) -> String {
    format!("{} {}", bank.code, bank.short_name)
}
