use crate::domain::Candle;

/// Append `page` to `series`, accepting only candles strictly newer than the
/// last accepted one. Returns the number of candles accepted.
///
/// Overlapping or repeated pages are deduplicated (first copy wins) and
/// out-of-order candles are dropped, never re-sorted.
pub fn merge_candles(series: &mut Vec<Candle>, page: impl IntoIterator<Item = Candle>) -> usize {
    let before = series.len();
    for candle in page {
        if series.last().map_or(true, |last| candle.time > last.time) {
            series.push(candle);
        }
    }
    series.len() - before
}
