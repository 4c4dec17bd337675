const HIRAGANA_START: u32 = 0x3041;
const HIRAGANA_END: u32 = 0x3096;
const KATAKANA_OFFSET: u32 = 0x60;

/// Voiced, semi-voiced and small katakana folded to their base form
const KANA_FOLDS: &[(char, char)] = &[
    ('ガ', 'カ'), ('ギ', 'キ'), ('グ', 'ク'), ('ゲ', 'ケ'), ('ゴ', 'コ'),
    ('ザ', 'サ'), ('ジ', 'シ'), ('ズ', 'ス'), ('ゼ', 'セ'), ('ゾ', 'ソ'),
    ('ダ', 'タ'), ('ヂ', 'チ'), ('ヅ', 'ツ'), ('デ', 'テ'), ('ド', 'ト'),
    ('バ', 'ハ'), ('ビ', 'ヒ'), ('ブ', 'フ'), ('ベ', 'ヘ'), ('ボ', 'ホ'),
    ('パ', 'ハ'), ('ピ', 'ヒ'), ('プ', 'フ'), ('ペ', 'ヘ'), ('ポ', 'ホ'),
    ('ァ', 'ア'), ('ィ', 'イ'), ('ゥ', 'ウ'), ('ェ', 'エ'), ('ォ', 'オ'),
    ('ッ', 'ツ'), ('ャ', 'ヤ'), ('ュ', 'ユ'), ('ョ', 'ヨ'), ('ヮ', 'ワ'),
    ('ヴ', 'ウ'), ('ヵ', 'カ'), ('ヶ', 'ケ'),
];

fn hiragana_to_katakana(c: char) -> char {
    let code = c as u32;
    if (HIRAGANA_START..=HIRAGANA_END).contains(&code) {
        char::from_u32(code + KATAKANA_OFFSET).unwrap_or(c)
    } else {
        c
    }
}

fn fold_kana(c: char) -> char {
    KANA_FOLDS
        .iter()
        .find(|(from, _)| *from == c)
        .map(|(_, to)| *to)
        .unwrap_or(c)
}

/// Search key for fuzzy matching: katakana, no diacritics, lowercase, no whitespace
pub fn normalize(s: &str) -> String {
    s.chars()
        .map(hiragana_to_katakana)
        .map(fold_kana)
        .flat_map(char::to_lowercase)
        .filter(|c| !c.is_whitespace())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hiragana_matches_katakana() {
        assert_eq!(normalize("ばなな"), normalize("バナナ"));
        assert_eq!(normalize("とよた"), "トヨタ");
    }

    #[test]
    fn test_diacritics_are_folded() {
        assert_eq!(normalize("ガ"), "カ");
        assert_eq!(normalize("パーソル"), "ハーソル");
        assert_eq!(normalize("ヴ"), "ウ");
        assert_eq!(normalize("ゔ"), "ウ");
        assert_eq!(normalize("キャノン"), "キヤノン");
        assert_eq!(normalize("が"), normalize("か"));
        assert_ne!(normalize("ガ"), normalize("キ"));
    }

    #[test]
    fn test_case_and_whitespace() {
        assert_eq!(normalize("Toyota Motor"), "toyotamotor");
        assert_eq!(normalize(" KDDI\t株式会社 "), "kddi株式会社");
    }

    #[test]
    fn test_idempotent() {
        for s in ["ソニーグループ", "みずほ フィナンシャル", "Sony Group", "ヴァイオ", "三菱UFJ"] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once);
        }
    }
}
