//! 分类与渲染调用的系统提示词

use serde_json::Value;

use super::directive::Directive;

/// 分类指令，回复必须是单个指令对象
pub const CLASSIFIER_PROMPT: &str = r#"You route questions for a school IoT assistant.
The data is a hierarchy: schools contain rooms, rooms contain sensors, and each sensor has a latest reading.

Decide whether the latest user message needs data from the IoT API and reply with exactly one JSON object and nothing else:

{"action": "none"}                                   - no data needed (greetings, follow-ups answerable from the conversation)
{"action": "list_schools"}                           - list all schools
{"action": "list_rooms", "school": "<school id>"}    - list the rooms of one school
{"action": "list_sensors", "room": "<room id>"}      - list the sensors in one room
{"action": "latest_value", "sensor": "<sensor id>"}  - latest reading of one sensor

Parameters must be identifiers (the `id` values) shown earlier in this conversation.
If the user names a school, room or sensor whose identifier you have not seen yet, choose the listing action one level up so the identifier becomes visible (for example list_schools before list_rooms).
Do not wrap the JSON in prose."#;

/// 无需数据时的回答指令
pub const CONVERSATION_PROMPT: &str = "You are a helpful assistant for a school IoT system \
that tracks schools, rooms, sensors and sensor readings. Answer the latest user message using \
the conversation so far. Do not invent schools, rooms, sensors or readings; if the user needs \
data that is not in the conversation, tell them what you can look up (schools, the rooms of a \
school, the sensors in a room, or a sensor's latest reading). Reply in plain text or Markdown, never JSON.";

/// 携带 `directive` 所获数据的渲染指令
pub fn render_prompt(directive: &Directive, data: &Value) -> String {
    let data = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
    format!(
        "You are a helpful assistant for a school IoT system.\n\
         The API call `{directive}` returned the data below.\n\n\
         <data>\n{data}\n</data>\n\n\
         Answer the latest user message using only this data:\n\
         - mention every entry in the data and nothing that is not in it; never invent, rename or merge entries\n\
         - show each entry's name together with its id so later questions can refer to it\n\
         - if the data is empty or reports no readings, say so plainly\n\
         Use lists or tables in Markdown where it helps. Do not return JSON."
    )
}
