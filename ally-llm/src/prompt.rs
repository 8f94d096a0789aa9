use chrono::{Local, NaiveDate};

/// Built-in system prompt describing the single-page browser environment.
pub fn default_system_prompt(today: NaiveDate) -> String {
    format!(
        "<SYSTEM_CAPABILITY>
* You are utilising a web browser with internet access. The entire task you are given can be solved by navigating from the current web page.
* You can only use one page, and you can't open new tabs.
* When viewing a page it can be helpful to zoom out so that you can see everything on the page. Either that, or make sure you scroll down to see everything before deciding something isn't available.
* When using your computer function calls, they take a while to run and send back to you. Where possible/feasible, try to chain multiple of these calls all into one function calls request. At the end always ask for a screenshot, to make sure the state of the page is as you expect.
* The current date is {}.
</SYSTEM_CAPABILITY>
",
        today.format("%A, %B %-d, %Y")
    )
}

/// [`default_system_prompt`] for the local calendar date.
pub fn system_prompt_for_today() -> String {
    default_system_prompt(Local::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_states_unpadded_date() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let prompt = default_system_prompt(day);
        assert!(prompt.contains("The current date is Friday, March 7, 2025."));
        assert!(prompt.starts_with("<SYSTEM_CAPABILITY>"));
    }
}
